//! Append object uploads and precondition handling.

#[cfg(test)]
mod tests {
    use rustblob_core::error::codes;
    use rustblob_core::{ObjectKind, Operation, RequestError};
    use rustblob_stream::{SessionState, UploadError, UploadOptions};

    use crate::{client_with, small_config};

    fn append_options() -> UploadOptions {
        UploadOptions::builder().kind(ObjectKind::Append).build()
    }

    #[tokio::test]
    async fn test_should_append_serially_whatever_the_parallelism() {
        let (service, client) = client_with(small_config(4, 8));
        let mut stream = client
            .open_write("log", append_options())
            .await
            .expect("open");
        assert_eq!(stream.parallelism(), 1);

        stream.write(b"line-1\nline-2\n").expect("write");
        stream.commit().await.expect("commit");

        assert_eq!(service.max_in_flight(), 1);
        assert_eq!(service.request_count(Operation::AppendBlock), 4);
        assert_eq!(
            service.object_data("log").as_deref(),
            Some(&b"line-1\nline-2\n"[..])
        );
    }

    #[tokio::test]
    async fn test_should_surface_first_append_conflict() {
        let (service, client) = client_with(small_config(4, 1));
        service.fail_nth(
            Operation::AppendBlock,
            2,
            RequestError::new(
                412,
                codes::APPEND_POSITION_CONDITION_NOT_MET,
                "append position not met",
            ),
        );

        let mut stream = client
            .open_write("log", append_options())
            .await
            .expect("open");
        stream.write(b"aaaabbbbcccc").expect("write is never blocked");

        let err = stream.commit().await.expect_err("commit must fail");
        let request = err.as_request().expect("request error");
        assert_eq!(request.status, 412);
        assert_eq!(request.code, codes::APPEND_POSITION_CONDITION_NOT_MET);
        assert_eq!(stream.state(), SessionState::Faulted);
        assert!(stream.is_committed());

        // The third chunk is never sent once the second has failed.
        assert_eq!(service.request_count(Operation::AppendBlock), 2);
        assert_eq!(service.object_data("log").as_deref(), Some(&b"aaaa"[..]));
    }

    #[tokio::test]
    async fn test_should_suppress_conflict_seen_on_retry() {
        let (service, client) = client_with(small_config(4, 1));
        service.fail_after_apply(
            Operation::AppendBlock,
            1,
            RequestError::new(
                412,
                codes::APPEND_POSITION_CONDITION_NOT_MET,
                "retry found its own earlier write",
            )
            .with_attempts(2),
        );

        let mut stream = client
            .open_write("log", append_options())
            .await
            .expect("open");
        stream.write(b"aaaabbbb").expect("write");
        stream.commit().await.expect("retried conflict is suppressed");

        assert!(stream.fault().is_none());
        assert_eq!(service.object_data("log").as_deref(), Some(&b"aaaabbbb"[..]));
    }

    #[tokio::test]
    async fn test_should_enforce_max_size() {
        let (service, client) = client_with(small_config(4, 1));
        let mut stream = client
            .open_write(
                "capped",
                UploadOptions::builder()
                    .kind(ObjectKind::Append)
                    .max_size(8)
                    .build(),
            )
            .await
            .expect("open");
        stream.write(b"aaaabbbbcccc").expect("write");

        let err = stream.flush().await.expect_err("flush must fail");
        assert_eq!(
            err.as_request().map(|e| e.code.as_str()),
            Some(codes::MAX_BLOB_SIZE_CONDITION_NOT_MET)
        );
        assert_eq!(service.properties("capped").map(|p| p.length), Some(8));

        assert!(matches!(
            stream.commit().await,
            Err(UploadError::Request(e)) if e.code == codes::MAX_BLOB_SIZE_CONDITION_NOT_MET
        ));
    }

    #[tokio::test]
    async fn test_should_resume_at_existing_length() {
        let (service, client) = client_with(small_config(4, 1));
        let mut first = client
            .open_write("journal", append_options())
            .await
            .expect("open");
        first.write(b"abcdef").expect("write");
        first.commit().await.expect("commit");

        let mut second = client
            .open_write(
                "journal",
                UploadOptions::builder()
                    .kind(ObjectKind::Append)
                    .create_new(false)
                    .build(),
            )
            .await
            .expect("reopen");
        assert_eq!(second.remote_offset(), 6);
        second.write(b"gh").expect("write");
        let summary = second.commit().await.expect("commit");

        assert_eq!(summary.bytes_uploaded, 2);
        assert_eq!(service.object_data("journal").as_deref(), Some(&b"abcdefgh"[..]));
    }
}
