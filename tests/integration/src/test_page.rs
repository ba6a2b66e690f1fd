//! Page object uploads.

#[cfg(test)]
mod tests {
    use rustblob_core::{Operation, PageRange};
    use rustblob_stream::{UploadError, UploadOptions};

    use crate::{client_with, random_bytes, small_config};

    fn page_options(length: u64) -> UploadOptions {
        UploadOptions::builder()
            .kind(rustblob_core::ObjectKind::Page)
            .page_length(length)
            .build()
    }

    #[tokio::test]
    async fn test_should_reject_unaligned_page_write() {
        let (service, client) = client_with(small_config(512, 2));
        let mut stream = client
            .open_write("disk", page_options(2048))
            .await
            .expect("open");

        let result = stream.write(&[0u8; 768]);
        assert!(matches!(
            result,
            Err(UploadError::UnalignedWrite {
                length: 768,
                page_size: 512
            })
        ));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.buffered_len(), 0);

        stream.commit().await.expect("commit");
        assert_eq!(service.request_count(Operation::PutPage), 0);
    }

    #[tokio::test]
    async fn test_should_reject_write_past_declared_length() {
        let (_service, client) = client_with(small_config(512, 2));
        let mut stream = client
            .open_write("disk", page_options(1024))
            .await
            .expect("open");

        stream.write(&[1u8; 512]).expect("first page");
        assert!(matches!(
            stream.write(&[1u8; 1024]),
            Err(UploadError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_should_write_pages_at_increasing_offsets() {
        let (service, client) = client_with(small_config(1024, 4));
        let data = random_bytes(3072);
        let mut stream = client
            .open_write("vhd", page_options(4096))
            .await
            .expect("open");
        for piece in data.chunks(512) {
            stream.write(piece).expect("write");
        }
        let summary = stream.commit().await.expect("commit");
        assert!(summary.content_md5.is_none());
        assert_eq!(summary.chunks, 3);

        let stored = service.object_data("vhd").expect("data");
        assert_eq!(stored.len(), 4096);
        assert_eq!(&stored[..3072], data.as_slice());
        assert!(stored[3072..].iter().all(|b| *b == 0));

        let ranges = client.page_ranges("vhd").await.expect("ranges");
        assert_eq!(ranges, vec![PageRange { start: 0, end: 3071 }]);
    }

    #[tokio::test]
    async fn test_should_store_page_md5_when_requested() {
        let (service, client) = client_with(small_config(512, 2));
        let mut options = page_options(1024);
        options.store_object_md5 = Some(true);

        let mut stream = client.open_write("hashed", options).await.expect("open");
        stream.write(&[9u8; 1024]).expect("write");
        let summary = stream.commit().await.expect("commit");

        assert!(summary.etag.is_some());
        assert_eq!(service.request_count(Operation::SetProperties), 1);
        assert_eq!(
            service.properties("hashed").expect("properties").content_md5,
            summary.content_md5
        );
    }

    #[tokio::test]
    async fn test_should_snapshot_committed_pages() {
        let (service, client) = client_with(small_config(512, 2));
        let mut stream = client
            .open_write("snap", page_options(512))
            .await
            .expect("open");
        stream.write(&[3u8; 512]).expect("write");
        stream.commit().await.expect("commit");

        let snapshot = client.snapshot("snap").await.expect("snapshot");
        assert!(snapshot.starts_with("snap?snapshot="));
        assert_eq!(
            service.snapshot_data(&snapshot).as_deref(),
            Some(&[3u8; 512][..])
        );
    }
}
