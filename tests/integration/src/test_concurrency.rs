//! Bounded parallelism and ordering under concurrent completion.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rustblob_core::{BlobRequest, Operation};
    use rustblob_stream::UploadOptions;

    use crate::{client_with, random_bytes, small_config};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_never_exceed_parallelism() {
        let (service, client) = client_with(small_config(16, 3));
        service.set_latency(Duration::from_millis(10));
        let data = random_bytes(16 * 12);

        let mut stream = client
            .open_write("wide", UploadOptions::default())
            .await
            .expect("open");
        stream.write(&data).expect("write");
        assert_eq!(stream.dispatched_chunks(), 12);

        stream.commit().await.expect("commit");
        assert!(service.max_in_flight() <= 3);
        assert!(service.max_in_flight() > 1);
        assert_eq!(service.object_data("wide").as_deref(), Some(data.as_slice()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_commit_blocks_in_submission_order() {
        let (service, client) = client_with(small_config(32, 8));
        service.set_latency(Duration::from_millis(5));
        let data = random_bytes(32 * 20 + 7);

        let mut stream = client
            .open_write("ordered", UploadOptions::default())
            .await
            .expect("open");
        for piece in data.chunks(50) {
            stream.write(piece).expect("write");
        }
        let expected_ids = stream.block_ids().to_vec();
        stream.commit().await.expect("commit");

        let committed = service
            .requests_of(Operation::PutBlockList)
            .into_iter()
            .find_map(|request| match request {
                BlobRequest::PutBlockList { block_ids, .. } => Some(block_ids),
                _ => None,
            })
            .expect("block list");
        assert_eq!(committed.len(), 21);
        assert_eq!(committed[..expected_ids.len()], expected_ids[..]);
        assert_eq!(service.object_data("ordered").as_deref(), Some(data.as_slice()));
    }

    #[tokio::test]
    async fn test_should_report_queued_bytes_without_blocking_writes() {
        let (service, client) = client_with(small_config(16, 2));
        service.set_latency(Duration::from_millis(50));
        let data = random_bytes(16 * 10 + 5);

        let mut stream = client
            .open_write("queued", UploadOptions::default())
            .await
            .expect("open");
        stream.write(&data).expect("write");
        assert_eq!(stream.outstanding(), 10);
        assert_eq!(stream.queued_bytes(), 160);
        assert_eq!(stream.buffered_len(), 5);

        stream.flush().await.expect("flush");
        assert_eq!(stream.queued_bytes(), 0);
        stream.commit().await.expect("commit");
        assert_eq!(service.object_data("queued").as_deref(), Some(data.as_slice()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_run_independent_streams_concurrently() {
        let (service, client) = client_with(small_config(64, 2));
        let mut handles = Vec::new();
        for i in 0..4 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("stream-{i}");
                let data = vec![i as u8; 500];
                let mut stream = client
                    .open_write(&key, UploadOptions::default())
                    .await
                    .expect("open");
                stream.write(&data).expect("write");
                stream.commit().await.expect("commit");
                (key, data)
            }));
        }

        for handle in handles {
            let (key, data) = handle.await.expect("join");
            assert_eq!(service.object_data(&key).as_deref(), Some(data.as_slice()));
        }
    }
}
