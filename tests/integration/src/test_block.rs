//! Block object uploads.

#[cfg(test)]
mod tests {
    use rustblob_core::checksums::compute_content_md5;
    use rustblob_core::{BlobRequest, ClientConfig, Metadata, ObjectKind, Operation};
    use rustblob_stream::{ReadOptions, SessionState, UploadOptions};

    use crate::{client_with, random_bytes, small_config};

    #[tokio::test]
    async fn test_should_dispatch_full_chunks_and_commit_in_order() {
        let (service, client) = client_with(small_config(4, 2));
        let mut stream = client
            .open_write("ten.bin", UploadOptions::default())
            .await
            .expect("open");

        stream.write(b"0123456789").expect("write");
        assert_eq!(stream.dispatched_chunks(), 2);
        assert_eq!(stream.buffered_len(), 2);

        let summary = stream.commit().await.expect("commit");
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.bytes_written, 10);
        assert_eq!(stream.state(), SessionState::Committed);

        let lists = service.requests_of(Operation::PutBlockList);
        assert_eq!(lists.len(), 1);
        let BlobRequest::PutBlockList { block_ids, .. } = &lists[0] else {
            panic!("expected a block list, got {:?}", lists[0]);
        };
        assert_eq!(block_ids.len(), 3);
        assert_eq!(block_ids.as_slice(), stream.block_ids());
        assert_eq!(
            service.object_data("ten.bin").as_deref(),
            Some(&b"0123456789"[..])
        );
    }

    #[tokio::test]
    async fn test_should_store_object_md5_for_block_objects() {
        let (service, client) = client_with(small_config(1024, 4));
        let data = random_bytes(5000);

        let mut stream = client
            .open_write("hashed", UploadOptions::default())
            .await
            .expect("open");
        for piece in data.chunks(333) {
            stream.write(piece).expect("write");
        }
        let summary = stream.commit().await.expect("commit");

        let expected = compute_content_md5(&data);
        assert_eq!(summary.content_md5.as_deref(), Some(expected.as_str()));
        let properties = service.properties("hashed").expect("properties");
        assert_eq!(properties.content_md5, Some(expected));
        assert_eq!(properties.committed_block_count, Some(5));
    }

    #[tokio::test]
    async fn test_should_skip_object_md5_when_disabled() {
        let (service, client) = client_with(small_config(8, 1));
        let mut stream = client
            .open_write(
                "plain",
                UploadOptions::builder().store_object_md5(false).build(),
            )
            .await
            .expect("open");
        stream.write(b"abc").expect("write");
        let summary = stream.commit().await.expect("commit");

        assert!(summary.content_md5.is_none());
        assert!(service.properties("plain").expect("properties").content_md5.is_none());
    }

    #[tokio::test]
    async fn test_should_send_transactional_md5_per_block() {
        let (service, client) = client_with(small_config(4, 1));
        let mut stream = client
            .open_write(
                "tx",
                UploadOptions::builder().transactional_md5(true).build(),
            )
            .await
            .expect("open");
        stream.write(b"abcdefg").expect("write");
        stream.commit().await.expect("commit");

        let hashes: Vec<_> = service
            .requests_of(Operation::PutBlock)
            .into_iter()
            .map(|request| match request {
                BlobRequest::PutBlock { content_md5, .. } => content_md5,
                other => panic!("unexpected request {other:?}"),
            })
            .collect();
        assert_eq!(
            hashes,
            vec![
                Some(compute_content_md5(b"abcd")),
                Some(compute_content_md5(b"efg")),
            ]
        );
    }

    #[tokio::test]
    async fn test_should_commit_empty_object() {
        let (service, client) = client_with(ClientConfig::default());
        let mut stream = client
            .open_write("empty", UploadOptions::default())
            .await
            .expect("open");
        let summary = stream.commit().await.expect("commit");

        assert_eq!(summary.chunks, 0);
        assert_eq!(service.request_count(Operation::PutBlock), 0);
        let properties = service.properties("empty").expect("properties");
        assert_eq!(properties.kind, ObjectKind::Block);
        assert_eq!(properties.length, 0);
    }

    #[tokio::test]
    async fn test_should_persist_user_metadata_and_read_ranges() {
        let (_service, client) = client_with(small_config(16, 3));
        let mut metadata = Metadata::new();
        metadata.insert("origin".to_owned(), "camera-7".to_owned());
        let data = random_bytes(100);

        let mut stream = client
            .open_write(
                "frame",
                UploadOptions::builder().metadata(metadata).build(),
            )
            .await
            .expect("open");
        stream.write(&data).expect("write");
        stream.commit().await.expect("commit");

        let mut reader = client
            .open_read("frame", ReadOptions::default())
            .await
            .expect("open read");
        assert_eq!(
            reader.properties().metadata.get("origin").map(String::as_str),
            Some("camera-7")
        );

        let mut out = Vec::new();
        let n = reader
            .read_range_to(rustblob_core::ByteRange::new(90, 50), &mut out)
            .await
            .expect("range");
        assert_eq!(n, 10);
        assert_eq!(out, &data[90..]);

        let mut past_end = Vec::new();
        let n = reader
            .read_range_to(rustblob_core::ByteRange::from_offset(100), &mut past_end)
            .await
            .expect("range past end");
        assert_eq!(n, 0);
        assert!(past_end.is_empty());
    }
}
