//! File operation flows against the in-memory share

#[cfg(test)]
mod tests {
    use crate::e2e_tests::{TestClient, TestContext};
    use crate::protocol::constants::{
        command, create_disposition, info_level, nt_create_flags, READ_ANDX_DATA_OFFSET,
    };
    use crate::wire::{read_u16_le, read_u32_le, unicode_bytes};
    use crate::NtStatus;
    use byteorder::{LittleEndian, WriteBytesExt};

    async fn connected() -> TestContext {
        let mut ctx = TestContext::new().await.unwrap();
        ctx.client.negotiate().await.unwrap();
        ctx.client.session_setup_guest().await.unwrap();
        ctx.client.tree_connect("public").await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_read_small_file() {
        let mut ctx = connected().await;

        let (resp, fid) = ctx
            .client
            .nt_create("\\tiny.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        // 3-byte file, 1024-byte request: DataLength 3, DataOffset 60,
        // DataLengthHigh 0, one pad byte before the payload
        let (resp, payload) = ctx.client.read(fid, 0, 1024).await.unwrap();
        let params = &resp.commands[0].params;
        assert_eq!(read_u16_le(params, 10).unwrap(), 3);
        assert_eq!(read_u16_le(params, 12).unwrap(), READ_ANDX_DATA_OFFSET);
        assert_eq!(read_u16_le(params, 14).unwrap(), 0);
        assert_eq!(resp.commands[0].data.len(), 4);
        assert_eq!(payload, b"abc");

        let resp = ctx.client.close_file(fid, 0).await.unwrap();
        assert_eq!(resp.header.status, 0);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_at_offset() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\docs\\alpha.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        let (_, payload) = ctx.client.read(fid, 6, 1024).await.unwrap();
        assert_eq!(payload, b"contents");
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_directory_rejected() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\docs", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        let (resp, _) = ctx.client.read(fid, 0, 16).await.unwrap();
        assert_eq!(resp.header.status, NtStatus::FileIsADirectory as u32);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_bad_fid() {
        let mut ctx = connected().await;
        let (resp, _) = ctx.client.read(0x4242, 0, 16).await.unwrap();
        assert_eq!(resp.header.status, NtStatus::SmbBadFid as u32);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_tid() {
        let mut ctx = TestContext::new().await.unwrap();
        ctx.client.negotiate().await.unwrap();
        ctx.client.session_setup_guest().await.unwrap();
        // No tree connect: any TID is bad
        ctx.client.tid = 99;
        let (resp, _) = ctx.client.read(1, 0, 16).await.unwrap();
        assert_eq!(resp.header.status, NtStatus::SmbBadTid as u32);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_nt_create_extended_response_word_count() {
        let mut ctx = connected().await;

        let (resp, _) = ctx
            .client
            .nt_create(
                "\\tiny.txt",
                nt_create_flags::EXTENDED_RESPONSE,
                create_disposition::FILE_OPEN,
                0,
            )
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);
        // 100 parameter bytes, but the word count is pinned at 0x2a
        assert_eq!(resp.commands[0].params.len(), 100);
        assert_eq!(resp.commands[0].word_count, 0x2A);

        let (resp, _) = ctx
            .client
            .nt_create("\\tiny.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.commands[0].params.len(), 68);
        assert_eq!(resp.commands[0].word_count, 34);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_nt_create_missing_file() {
        let mut ctx = connected().await;
        let (resp, _) = ctx
            .client
            .nt_create("\\missing.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.header.status, NtStatus::NoSuchFile as u32);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\new.bin", 0, create_disposition::FILE_OVERWRITE_IF, 0)
            .await
            .unwrap();

        let resp = ctx.client.write(fid, 0, b"written bytes").await.unwrap();
        assert_eq!(resp.header.status, 0);
        let count = read_u16_le(&resp.commands[0].params, 4).unwrap();
        assert_eq!(count as usize, b"written bytes".len());

        let (_, payload) = ctx.client.read(fid, 0, 64).await.unwrap();
        assert_eq!(payload, b"written bytes");

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let mut ctx = connected().await;

        let resp = ctx.client.delete("\\docs\\*.md").await.unwrap();
        assert_eq!(resp.header.status, 0);

        // Deleted for real
        let (resp, _) = ctx
            .client
            .nt_create("\\docs\\beta.md", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.header.status, NtStatus::NoSuchFile as u32);

        // No match at all
        let resp = ctx.client.delete("\\docs\\*.doc").await.unwrap();
        assert_eq!(resp.header.status, NtStatus::NoSuchFile as u32);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_first2_lists_directory() {
        let mut ctx = connected().await;

        let resp = ctx.client.find_first2("\\docs\\*", 64).await.unwrap();
        assert_eq!(resp.header.status, 0);
        let (t2_params, t2_data) = TestClient::trans2_blocks(&resp).unwrap();
        let count = read_u16_le(&t2_params, 2).unwrap();
        let end_of_search = read_u16_le(&t2_params, 4).unwrap();
        assert_eq!(count, 2);
        assert_eq!(end_of_search, 1);

        // First entry name: length at 60, name at 94
        let name_len = read_u32_le(&t2_data, 60).unwrap() as usize;
        let name = crate::wire::decode_unicode_bytes(&t2_data, 94, name_len).unwrap();
        assert_eq!(name, "alpha.txt");

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_first2_no_match() {
        let mut ctx = connected().await;
        let resp = ctx.client.find_first2("\\docs\\*.zip", 64).await.unwrap();
        assert_eq!(resp.header.status, NtStatus::NoSuchFile as u32);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_path_information_standard() {
        let mut ctx = connected().await;

        let resp = ctx
            .client
            .query_path_information("\\tiny.txt", info_level::QUERY_FILE_STANDARD_INFO)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);
        let (_, t2_data) = TestClient::trans2_blocks(&resp).unwrap();
        // EndOfFile at offset 8
        assert_eq!(crate::wire::read_u64_le(&t2_data, 8).unwrap(), 3);
        assert_eq!(t2_data[21], 0); // not a directory

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_end_of_file_information() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\tiny.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();

        let mut payload = Vec::new();
        payload.write_u64::<LittleEndian>(1).unwrap();
        let level = info_level::INFO_PASSTHROUGH + info_level::FILE_END_OF_FILE_INFORMATION;
        let resp = ctx
            .client
            .set_file_information(fid, level, &payload)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        let (_, data) = ctx.client.read(fid, 0, 16).await.unwrap();
        assert_eq!(data, b"a");

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_disposition_deletes_on_close() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\docs\\alpha.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();

        let level = info_level::INFO_PASSTHROUGH + info_level::FILE_DISPOSITION_INFORMATION;
        let resp = ctx.client.set_file_information(fid, level, &[1]).await.unwrap();
        assert_eq!(resp.header.status, 0);
        ctx.client.close_file(fid, 0).await.unwrap();

        let (resp, _) = ctx
            .client
            .nt_create("\\docs\\alpha.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.header.status, NtStatus::NoSuchFile as u32);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_rename_information() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\docs\\alpha.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();

        let target = unicode_bytes("renamed.txt");
        let mut payload = Vec::new();
        payload.push(0); // replace if exists
        payload.extend_from_slice(&[0; 3]);
        payload.write_u32::<LittleEndian>(0).unwrap(); // root directory
        payload.write_u32::<LittleEndian>(target.len() as u32).unwrap();
        payload.extend_from_slice(&target);

        let level = info_level::INFO_PASSTHROUGH + info_level::FILE_RENAME_INFORMATION;
        let resp = ctx
            .client
            .set_file_information(fid, level, &payload)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        let (resp, _) = ctx
            .client
            .nt_create("\\docs\\renamed.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_information_non_passthrough_rejected() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\tiny.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();

        // Old SMB_INFO_STANDARD level is below the pass-through range
        let resp = ctx
            .client
            .set_file_information(fid, 0x0001, &[0; 8])
            .await
            .unwrap();
        assert_eq!(resp.header.status, NtStatus::NotSupported as u32);

        // Unknown pass-through class
        let resp = ctx
            .client
            .set_file_information(fid, info_level::INFO_PASSTHROUGH + 55, &[0; 8])
            .await
            .unwrap();
        assert_eq!(resp.header.status, NtStatus::NotImplemented as u32);

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_sets_mtime() {
        let mut ctx = connected().await;
        let (_, fid) = ctx
            .client
            .nt_create("\\tiny.txt", 0, create_disposition::FILE_OPEN, 0)
            .await
            .unwrap();

        let mtime_secs = 1_700_000_000u32;
        ctx.client.close_file(fid, mtime_secs).await.unwrap();

        let resp = ctx
            .client
            .query_path_information("\\tiny.txt", info_level::QUERY_FILE_BASIC_INFO)
            .await
            .unwrap();
        let (_, t2_data) = TestClient::trans2_blocks(&resp).unwrap();
        // LastWriteTime at offset 16, as SMB time
        let written = crate::wire::read_u64_le(&t2_data, 16).unwrap();
        assert_eq!(
            crate::wire::smb_to_system_time(written),
            mtime_secs as i64 * 1000
        );

        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_and_check_directory() {
        let mut ctx = connected().await;

        // Pathname data block begins at absolute offset 35; the format
        // byte leaves the string already word aligned.
        let mut data = vec![0x04];
        data.extend_from_slice(&crate::wire::unicode_bytes_nul("\\fresh"));
        let resp = ctx
            .client
            .roundtrip(command::CREATE_DIRECTORY, Vec::new(), data.clone())
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        let resp = ctx
            .client
            .roundtrip(command::CHECK_DIRECTORY, Vec::new(), data.clone())
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        let resp = ctx
            .client
            .roundtrip(command::DELETE_DIRECTORY, Vec::new(), data)
            .await
            .unwrap();
        assert_eq!(resp.header.status, 0);

        ctx.shutdown().await.unwrap();
    }
}
