//! End-to-end behavior: a stub talking to a served in-memory filesystem.

use std::io::SeekFrom;
use std::time::Duration;

use farfs::{ErrorCode, FileKind, OpenOptions, Vfs, VfsFile};
use farfs_testkit::connected_pair;

#[tokio::test]
async fn stat_through_the_channel_matches_the_served_filesystem() {
    let pair = connected_pair();
    pair.fs.put("/a.txt", b"hello world").await.unwrap();

    let remote = pair.remote.stat("/a.txt").await.unwrap();
    let direct = pair.fs.stat("/a.txt").await.unwrap();
    assert_eq!(remote, direct);
    assert_eq!(remote.kind, FileKind::File);
    assert_eq!(remote.size, 11);
}

#[tokio::test]
async fn open_read_close_lifecycle() {
    let pair = connected_pair();
    pair.fs.put("/a.txt", b"0123456789abcdef").await.unwrap();

    let file = pair
        .remote
        .open("/a.txt", OpenOptions::read_only())
        .await
        .unwrap();
    assert_eq!(file.fd(), 3);
    assert_eq!(file.path(), "/a.txt");
    assert_eq!(file.position(), 0);
    assert_eq!(pair.dispatcher.open_handles(), 1);

    // A sequential read advances the cursor on both sides.
    let data = file.read(10).await.unwrap();
    assert_eq!(data, b"0123456789");
    assert_eq!(file.position(), 10);
    assert_eq!(pair.dispatcher.recorded_position(3), Some(10));

    let rest = file.read(100).await.unwrap();
    assert_eq!(rest, b"abcdef");

    VfsFile::close(&file).await.unwrap();
    assert_eq!(pair.dispatcher.open_handles(), 0);

    // A closed proxy fails locally, without another round trip.
    let sent = pair.client_session.stats().requests_sent;
    let err = file.read(1).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::HandleClosed);
    assert_eq!(pair.client_session.stats().requests_sent, sent);
}

#[tokio::test]
async fn writes_persist_in_the_served_filesystem() {
    let pair = connected_pair();

    let file = pair
        .remote
        .open("/new.txt", OpenOptions::read_write())
        .await
        .unwrap();
    assert_eq!(file.write(b"hello ").await.unwrap(), 6);
    assert_eq!(file.write(b"farfs").await.unwrap(), 5);
    assert_eq!(file.position(), 11);
    VfsFile::close(&file).await.unwrap();

    assert_eq!(pair.fs.get("/new.txt").await.unwrap(), b"hello farfs");
}

#[tokio::test]
async fn vectored_transfers_round_trip() {
    let pair = connected_pair();
    pair.fs.put("/v", b"aaabbbbcc").await.unwrap();

    let file = pair
        .remote
        .open("/v", OpenOptions::read_write())
        .await
        .unwrap();

    let bufs = file.read_vectored_at(0, &[3, 4, 2]).await.unwrap();
    assert_eq!(bufs, vec![b"aaa".to_vec(), b"bbbb".to_vec(), b"cc".to_vec()]);

    let written = file
        .write_vectored_at(9, &[b"dd".to_vec(), b"e".to_vec()])
        .await
        .unwrap();
    assert_eq!(written, 3);
    VfsFile::close(&file).await.unwrap();

    assert_eq!(pair.fs.get("/v").await.unwrap(), b"aaabbbbccdde");
}

#[tokio::test]
async fn seek_from_end_consults_the_remote_size() {
    let pair = connected_pair();
    pair.fs.put("/s", &[0u8; 100]).await.unwrap();

    let file = pair
        .remote
        .open("/s", OpenOptions::read_only())
        .await
        .unwrap();
    assert_eq!(file.seek(SeekFrom::End(-25)).await.unwrap(), 75);
    assert_eq!(file.read(100).await.unwrap().len(), 25);
}

#[tokio::test]
async fn directory_operations_relay_their_errors() {
    let pair = connected_pair();
    let remote = &pair.remote;

    remote.mkdir("/d", 0o755).await.unwrap();
    remote.mkdir("/d/sub", 0o755).await.unwrap();
    pair.fs.put("/d/f", b"x").await.unwrap();

    let entries = remote.read_dir("/d").await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["f", "sub"]);

    let err = remote.rmdir("/d").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DirectoryNotEmpty);

    remote.unlink("/d/f").await.unwrap();
    remote.rmdir("/d/sub").await.unwrap();
    remote.rmdir("/d").await.unwrap();
    assert!(!remote.exists("/d").await.unwrap());
}

#[tokio::test]
async fn symlinks_and_renames_work_through_the_stub() {
    let pair = connected_pair();
    let remote = &pair.remote;

    pair.fs.put("/real", b"data").await.unwrap();
    remote.symlink("/real", "/alias").await.unwrap();
    assert_eq!(remote.read_link("/alias").await.unwrap(), "/real");
    assert!(remote.stat("/alias").await.unwrap().is_file());
    assert!(remote.lstat("/alias").await.unwrap().is_symlink());

    remote.rename("/real", "/moved").await.unwrap();
    assert!(remote.exists("/moved").await.unwrap());
    assert!(!remote.exists("/real").await.unwrap());
}

#[tokio::test]
async fn missing_files_fail_with_the_remote_code() {
    let pair = connected_pair();

    let err = pair
        .remote
        .open("/nope", OpenOptions::read_only())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.message(), "/nope");
}

#[tokio::test]
async fn concurrent_calls_share_one_session() {
    let pair = connected_pair();
    for i in 0..10 {
        pair.fs
            .put(&format!("/f{i}"), format!("content {i}").as_bytes())
            .await
            .unwrap();
    }

    let reads = (0..10).map(|i| {
        let remote = &pair.remote;
        async move {
            let file = remote
                .open(&format!("/f{i}"), OpenOptions::read_only())
                .await?;
            let data = file.read(100).await?;
            VfsFile::close(&file).await?;
            Ok::<_, farfs::FsError>(data)
        }
    });

    let results = futures::future::join_all(reads).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), format!("content {i}").as_bytes());
    }
    assert_eq!(pair.dispatcher.open_handles(), 0);
    assert_eq!(pair.client_session.stats().unknown_responses, 0);
}

#[tokio::test]
async fn a_tight_deadline_still_admits_prompt_answers() {
    let pair = farfs_testkit::connected_pair_with_timeout(Duration::from_millis(50));

    pair.fs.put("/quick", b"x").await.unwrap();
    assert!(pair.remote.exists("/quick").await.unwrap());

    // A prompt remote failure is that failure, not a deadline rejection.
    let err = pair.remote.stat("/definitely-missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}
