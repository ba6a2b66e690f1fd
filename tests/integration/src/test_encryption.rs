//! Client-side encryption through write and read streams.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rustblob_core::{ByteRange, ObjectKind};
    use rustblob_crypto::{
        ENCRYPTION_METADATA_KEY, EncryptionError, EncryptionMaterial, EncryptionPolicy,
        InMemoryKeyResolver, SymmetricKey,
    };
    use rustblob_stream::{BlobClient, ReadOptions, UploadError, UploadOptions};

    use crate::{client_with, policy_with_key, random_bytes, small_config};

    async fn upload(client: &BlobClient, key: &str, options: UploadOptions, data: &[u8]) {
        let mut stream = client.open_write(key, options).await.expect("open");
        for piece in data.chunks(100) {
            stream.write(piece).expect("write");
        }
        stream.commit().await.expect("commit");
    }

    #[tokio::test]
    async fn test_should_round_trip_encrypted_block_object() {
        let (service, client) = client_with(small_config(64, 3));
        let (_key, policy) = policy_with_key("kek-1");
        let client = client.with_encryption(policy);
        let data = random_bytes(1000);

        upload(&client, "secret", UploadOptions::default(), &data).await;

        let stored = service.object_data("secret").expect("stored");
        assert_eq!(stored.len(), 1008);
        assert_ne!(&stored[..1000], data.as_slice());

        let properties = service.properties("secret").expect("properties");
        let material = EncryptionMaterial::from_metadata(&properties.metadata)
            .expect("parse")
            .expect("material present");
        assert_eq!(material.validate().expect("valid").key_id, "kek-1");

        let mut reader = client
            .open_read("secret", ReadOptions::default())
            .await
            .expect("open read");
        assert!(reader.is_encrypted());
        assert_eq!(reader.read_all().await.expect("read"), data);
    }

    #[tokio::test]
    async fn test_should_pad_once_when_commit_is_retried() {
        let (service, client) = client_with(small_config(64, 2));
        let (_key, policy) = policy_with_key("kek-retry");
        let client = client.with_encryption(policy);
        service.set_latency(std::time::Duration::from_millis(100));
        let data = random_bytes(200);

        let mut stream = client
            .open_write("retried", UploadOptions::default())
            .await
            .expect("open");
        stream.write(&data).expect("write");
        let first =
            tokio::time::timeout(std::time::Duration::from_millis(5), stream.commit()).await;
        assert!(first.is_err());
        stream.commit().await.expect("resumed commit");

        assert_eq!(service.object_data("retried").map(|d| d.len()), Some(208));
        let mut reader = client
            .open_read("retried", ReadOptions::default())
            .await
            .expect("open read");
        assert_eq!(reader.read_all().await.expect("read"), data);
    }

    #[tokio::test]
    async fn test_should_read_encrypted_ranges() {
        let (_service, client) = client_with(small_config(64, 2));
        let (_key, policy) = policy_with_key("kek-range");
        let client = client.with_encryption(policy);
        let data = random_bytes(333);
        upload(&client, "ranged", UploadOptions::default(), &data).await;

        let mut reader = client
            .open_read("ranged", ReadOptions::default())
            .await
            .expect("open read");
        for (offset, count) in [(0, 5), (3, 40), (16, 16), (40, 10), (300, 100), (330, 3)] {
            let mut out = Vec::new();
            let n = reader
                .read_range_to(ByteRange::new(offset, count), &mut out)
                .await
                .unwrap_or_else(|e| panic!("range {offset}+{count}: {e}"));
            let start = usize::try_from(offset).expect("offset");
            let end = (start + usize::try_from(count).expect("count")).min(data.len());
            assert_eq!(out, &data[start..end], "range {offset}+{count}");
            assert_eq!(n, (end - start) as u64);
        }

        let mut tail = Vec::new();
        reader
            .read_range_to(ByteRange::from_offset(250), &mut tail)
            .await
            .expect("open-ended range");
        assert_eq!(tail, &data[250..]);
    }

    #[tokio::test]
    async fn test_should_round_trip_encrypted_page_object() {
        let (service, client) = client_with(small_config(512, 2));
        let (_key, policy) = policy_with_key("kek-page");
        let client = client.with_encryption(policy);
        let data = random_bytes(2048);

        let mut stream = client
            .open_write(
                "disk",
                UploadOptions::builder()
                    .kind(ObjectKind::Page)
                    .page_length(2048)
                    .build(),
            )
            .await
            .expect("open");
        assert!(stream.is_encrypted());
        stream.write(&data).expect("write");
        stream.commit().await.expect("commit");

        assert_eq!(service.object_data("disk").map(|d| d.len()), Some(2048));

        let mut reader = client
            .open_read("disk", ReadOptions::default())
            .await
            .expect("open read");
        assert_eq!(reader.read_all().await.expect("read"), data);

        let mut out = Vec::new();
        reader
            .read_range_to(ByteRange::new(1000, 100), &mut out)
            .await
            .expect("range");
        assert_eq!(out, &data[1000..1100]);
    }

    #[tokio::test]
    async fn test_should_fail_closed_when_encryption_is_required() {
        let (_service, client) = client_with(small_config(64, 2));
        upload(
            &client,
            "plain",
            UploadOptions::default(),
            b"not encrypted at all",
        )
        .await;

        let result = client
            .open_read(
                "plain",
                ReadOptions::builder().require_encryption(true).build(),
            )
            .await;
        assert!(matches!(
            result,
            Err(UploadError::Encryption(EncryptionError::EncryptionRequired))
        ));

        let mut reader = client
            .open_read("plain", ReadOptions::default())
            .await
            .expect("optional encryption reads plaintext");
        assert!(!reader.is_encrypted());
        assert_eq!(
            reader.read_all().await.expect("read"),
            b"not encrypted at all"
        );
    }

    #[tokio::test]
    async fn test_should_reject_mismatched_key() {
        let (service, writer) = client_with(small_config(64, 2));
        let (_key, policy) = policy_with_key("kek-a");
        upload(
            &writer.with_encryption(policy),
            "obj",
            UploadOptions::default(),
            b"hello",
        )
        .await;

        let (_other, other_policy) = policy_with_key("kek-b");
        let reader_client = BlobClient::new(service.clone(), small_config(64, 2))
            .with_encryption(other_policy);
        let mut reader = reader_client
            .open_read("obj", ReadOptions::default())
            .await
            .expect("open read");

        let mut out = Vec::new();
        let result = reader.read_to(&mut out).await;
        assert!(matches!(
            result,
            Err(UploadError::Encryption(EncryptionError::KeyMismatch { .. }))
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_should_resolve_rotated_keys_by_id() {
        let (service, client) = client_with(small_config(64, 2));
        let old_key = Arc::new(SymmetricKey::generate("kek-2023"));
        let new_key = Arc::new(SymmetricKey::generate("kek-2024"));

        let old_client = client
            .clone()
            .with_encryption(EncryptionPolicy::builder().key(old_key.clone()).build());
        upload(&old_client, "old", UploadOptions::default(), b"old data").await;
        let new_client = client
            .with_encryption(EncryptionPolicy::builder().key(new_key.clone()).build());
        upload(&new_client, "new", UploadOptions::default(), b"new data").await;

        let resolver = Arc::new(InMemoryKeyResolver::new());
        resolver.insert(old_key);
        resolver.insert(new_key);
        let reader_client = BlobClient::new(service.clone(), small_config(64, 2))
            .with_encryption(EncryptionPolicy::builder().resolver(resolver.clone()).build());

        for (key, expected) in [("old", &b"old data"[..]), ("new", &b"new data"[..])] {
            let mut reader = reader_client
                .open_read(key, ReadOptions::default())
                .await
                .expect("open read");
            assert_eq!(reader.read_all().await.expect("read"), expected);
        }

        resolver.remove("kek-2023");
        let mut reader = reader_client
            .open_read("old", ReadOptions::default())
            .await
            .expect("open read");
        assert!(matches!(
            reader.read_all().await,
            Err(UploadError::Encryption(EncryptionError::KeyNotResolved { .. }))
        ));
    }

    #[tokio::test]
    async fn test_should_reject_corrupt_encryption_record() {
        let (service, client) = client_with(small_config(64, 2));
        let mut metadata = rustblob_core::Metadata::new();
        metadata.insert(ENCRYPTION_METADATA_KEY.to_owned(), "{not json".to_owned());
        service.insert_object(
            "corrupt",
            ObjectKind::Block,
            bytes::Bytes::from_static(&[0u8; 32]),
            metadata,
        );

        let result = client.open_read("corrupt", ReadOptions::default()).await;
        assert!(matches!(
            result,
            Err(UploadError::Encryption(EncryptionError::MalformedMetadata(_)))
        ));
    }

    #[tokio::test]
    async fn test_should_write_plaintext_when_encryption_is_declined() {
        let (service, client) = client_with(small_config(64, 2));
        let (_key, policy) = policy_with_key("kek-opt-out");
        let client = client.with_encryption(policy);
        upload(
            &client,
            "clear",
            UploadOptions::builder().encrypt(false).build(),
            b"visible",
        )
        .await;

        assert_eq!(service.object_data("clear").as_deref(), Some(&b"visible"[..]));
        assert!(
            !service
                .properties("clear")
                .expect("properties")
                .metadata
                .contains_key(ENCRYPTION_METADATA_KEY)
        );
    }
}
