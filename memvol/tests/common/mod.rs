#![allow(dead_code)]

use async_glfs::Session;
use memvol::MemVolume;

use std::convert::TryFrom;
use std::path::Path;
use std::sync::Arc;

pub fn mount() -> (Arc<MemVolume>, Session) {
    mount_with_batch(128 * 1024)
}

pub fn mount_with_batch(readdir_batch: usize) -> (Arc<MemVolume>, Session) {
    let volume = Arc::new(MemVolume::new("test"));
    let subvol = Arc::clone(&volume);
    let session = Session::builder()
        .readdir_batch(readdir_batch)
        .subvol(subvol)
        .build();
    (volume, session)
}

pub async fn write_file(session: &Session, path: &str, data: &[u8]) {
    let fd = session
        .creat(Path::new(path), libc::O_WRONLY | libc::O_TRUNC, 0o644)
        .await
        .unwrap();
    assert_eq!(fd.pwrite(data, 0, 0).await.unwrap(), data.len());
    fd.close().await.unwrap();
}

pub async fn read_file(session: &Session, path: &str) -> Vec<u8> {
    let fd = session.open(Path::new(path), libc::O_RDONLY).await.unwrap();
    let size = usize::try_from(fd.fstat().await.unwrap().st_size).unwrap();
    let mut buf = vec![0; size];
    assert_eq!(fd.pread(&mut buf, 0, 0).await.unwrap(), size);
    fd.close().await.unwrap();
    buf
}
