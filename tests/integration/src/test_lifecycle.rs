//! Flush and commit semantics of write streams.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rustblob_core::{Operation, RequestError};
    use rustblob_stream::{FlushStatus, SessionState, UploadError, UploadOptions};
    use tokio_util::sync::CancellationToken;

    use crate::{client_with, small_config};

    #[tokio::test]
    async fn test_should_flush_idempotently() {
        let (service, client) = client_with(small_config(4, 2));
        let mut stream = client
            .open_write("f", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"abcdef").expect("write");

        stream.flush().await.expect("first flush");
        assert_eq!(stream.buffered_len(), 0);
        assert_eq!(stream.outstanding(), 0);
        assert_eq!(stream.state(), SessionState::Open);
        let staged = service.request_count(Operation::PutBlock);
        assert_eq!(staged, 2);

        stream.flush().await.expect("second flush");
        assert_eq!(service.request_count(Operation::PutBlock), staged);
        assert_eq!(service.uncommitted_block_count("f"), 2);

        stream.commit().await.expect("commit");
        assert_eq!(service.object_data("f").as_deref(), Some(&b"abcdef"[..]));
    }

    #[tokio::test]
    async fn test_should_reject_second_commit_and_later_writes() {
        let (service, client) = client_with(small_config(4, 2));
        let mut stream = client
            .open_write("once", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"data").expect("write");
        stream.commit().await.expect("commit");

        assert!(matches!(
            stream.commit().await,
            Err(UploadError::AlreadyCommitted)
        ));
        assert!(matches!(
            stream.write(b"more"),
            Err(UploadError::WriteAfterCommit)
        ));
        assert_eq!(service.request_count(Operation::PutBlockList), 1);
    }

    #[tokio::test]
    async fn test_should_keep_buffering_after_fault() {
        let (service, client) = client_with(small_config(4, 1));
        service.fail_nth(
            Operation::PutBlock,
            1,
            RequestError::new(500, "InternalError", "disk on fire"),
        );
        let mut stream = client
            .open_write("broken", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"abcd").expect("write");

        let err = stream.flush().await.expect_err("flush must fail");
        assert_eq!(err.as_request().map(|e| e.status), Some(500));
        assert_eq!(stream.state(), SessionState::Faulted);

        stream.write(b"efgh").expect("write after fault still buffers");
        let err = stream.commit().await.expect_err("commit must fail");
        assert_eq!(err.as_request().map(|e| e.message.as_str()), Some("disk on fire"));
        assert_eq!(service.request_count(Operation::PutBlock), 1);
        assert_eq!(service.request_count(Operation::PutBlockList), 0);
        assert!(service.properties("broken").is_none());
    }

    #[tokio::test]
    async fn test_should_surface_commit_request_failure() {
        let (service, client) = client_with(small_config(4, 2));
        service.fail_nth(
            Operation::PutBlockList,
            1,
            RequestError::new(503, "ServerBusy", "try later"),
        );
        let mut stream = client
            .open_write("late", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"abcdefgh").expect("write");

        let err = stream.commit().await.expect_err("commit must fail");
        assert_eq!(err.as_request().map(|e| e.status), Some(503));
        assert_eq!(stream.fault().map(|e| e.status), Some(503));
        assert!(stream.is_committed());
        assert_eq!(stream.state(), SessionState::Faulted);
    }

    #[tokio::test]
    async fn test_should_stop_waiting_when_flush_is_cancelled() {
        let (service, client) = client_with(small_config(4, 2));
        service.set_latency(Duration::from_millis(200));
        let mut stream = client
            .open_write("slow", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"abcdefgh").expect("write");

        let token = CancellationToken::new();
        token.cancel();
        let status = stream
            .flush_with_cancel(&token)
            .await
            .expect("cancelled flush");
        assert_eq!(status, FlushStatus::Cancelled);
        assert_eq!(stream.state(), SessionState::Open);

        let status = stream
            .flush_with_cancel(&CancellationToken::new())
            .await
            .expect("flush");
        assert_eq!(status, FlushStatus::Completed);
        assert_eq!(stream.outstanding(), 0);

        stream.commit().await.expect("commit");
        assert_eq!(service.object_data("slow").as_deref(), Some(&b"abcdefgh"[..]));
    }

    #[tokio::test]
    async fn test_should_resume_commit_after_cancelled_wait() {
        let (service, client) = client_with(small_config(4, 2));
        service.set_latency(Duration::from_millis(200));
        let mut stream = client
            .open_write("retry", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"0123456789").expect("write");

        let first = tokio::time::timeout(Duration::from_millis(10), stream.commit()).await;
        assert!(first.is_err());
        assert_eq!(stream.state(), SessionState::Committing);
        assert!(!stream.is_committed());
        assert!(matches!(
            stream.write(b"late"),
            Err(UploadError::WriteAfterCommit)
        ));
        assert_eq!(service.request_count(Operation::PutBlockList), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let summary = stream.commit().await.expect("resumed commit");
        assert_eq!(summary.bytes_written, 10);
        assert_eq!(summary.chunks, 3);
        assert!(stream.is_committed());
        assert_eq!(stream.state(), SessionState::Committed);
        assert_eq!(
            service.object_data("retry").as_deref(),
            Some(&b"0123456789"[..])
        );
        assert_eq!(service.request_count(Operation::PutBlockList), 1);
        assert!(matches!(
            stream.commit().await,
            Err(UploadError::AlreadyCommitted)
        ));
    }

    #[tokio::test]
    async fn test_should_keep_state_when_flushing_a_sealed_stream() {
        let (service, client) = client_with(small_config(4, 2));
        service.set_latency(Duration::from_millis(100));
        let mut stream = client
            .open_write("sealed", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"abcdef").expect("write");

        let first = tokio::time::timeout(Duration::from_millis(5), stream.commit()).await;
        assert!(first.is_err());
        stream.flush().await.expect("flush");
        assert_eq!(stream.state(), SessionState::Committing);
        stream.commit().await.expect("commit");
        assert_eq!(stream.state(), SessionState::Committed);
    }

    #[tokio::test]
    async fn test_should_track_positions() {
        let (_service, client) = client_with(small_config(8, 2));
        let mut stream = client
            .open_write("pos", UploadOptions::default())
            .await
            .expect("open");
        stream.write(b"0123456789abc").expect("write");
        assert_eq!(stream.position(), 13);
        assert_eq!(stream.remote_offset(), 8);
        assert_eq!(stream.buffered_len(), 5);
        assert!(!stream.is_committed());

        let summary = stream.commit().await.expect("commit");
        assert_eq!(summary.bytes_uploaded, 13);
        assert_eq!(stream.remote_offset(), 13);
    }
}
