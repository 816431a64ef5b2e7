mod common;

use common::{mount, read_file, write_file};

use async_glfs::{Errno, Scheduler, Session};
use memvol::MemVolume;

use std::io::IoSlice;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_std::task::block_on;
use futures::channel::{mpsc, oneshot};
use futures::future::BoxFuture;
use futures::StreamExt;

#[test]
fn write_then_fsync_complete_exactly_once() {
    block_on(async {
        let (volume, session) = mount();
        volume.set_max_write(Some(3));
        let fd = session
            .creat(Path::new("/f"), libc::O_RDWR, 0o644)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded();

        let (write_calls, write_tx) = (Arc::clone(&calls), tx.clone());
        fd.write_async(b"abcdef", 0, move |_, ret| {
            let _ = write_calls.fetch_add(1, Ordering::SeqCst);
            write_tx.unbounded_send(("write", ret)).unwrap();
        })
        .unwrap();

        let (sync_calls, sync_tx) = (Arc::clone(&calls), tx);
        fd.fsync_async(move |_, ret| {
            let _ = sync_calls.fetch_add(1, Ordering::SeqCst);
            sync_tx.unbounded_send(("fsync", ret)).unwrap();
        })
        .unwrap();

        let mut results = Vec::new();
        while let Some(result) = rx.next().await {
            results.push(result);
        }
        results.sort();
        assert_eq!(results, vec![("fsync", 0), ("write", 3)]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(volume.fsync_calls(), 1);

        fd.close().await.unwrap();
        volume.set_max_write(None);
        assert_eq!(read_file(&session, "/f").await, b"abc");
    });
}

#[test]
fn async_reads_own_their_buffers() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"hello world").await;
        let fd = session.open(Path::new("/f"), libc::O_RDONLY).await.unwrap();

        let (tx, rx) = oneshot::channel();
        fd.pread_async(64, 6, 0, move |_, ret, buf| {
            tx.send((ret, buf)).unwrap();
        })
        .unwrap();
        let (ret, buf) = rx.await.unwrap();
        assert_eq!(ret, 5);
        assert_eq!(buf, b"world");

        let (tx, rx) = oneshot::channel();
        fd.preadv_async(&[2, 3], 0, 0, move |_, ret, bufs| {
            tx.send((ret, bufs)).unwrap();
        })
        .unwrap();
        let (ret, bufs) = rx.await.unwrap();
        assert_eq!(ret, 5);
        assert_eq!(bufs, vec![b"he".to_vec(), b"llo".to_vec()]);

        fd.close().await.unwrap();
    });
}

#[test]
fn async_failures_are_negative_errno() {
    block_on(async {
        let (_, session) = mount();
        write_file(&session, "/f", b"data").await;
        let fd = session.open(Path::new("/f"), libc::O_RDONLY).await.unwrap();

        let (tx, rx) = oneshot::channel();
        let iov = [IoSlice::new(b"x"), IoSlice::new(b"y")];
        fd.pwritev_async(&iov, 0, 0, move |_, ret| tx.send(ret).unwrap())
            .unwrap();
        assert_eq!(rx.await.unwrap(), -(libc::EBADF as isize));

        let (tx, rx) = oneshot::channel();
        fd.ftruncate_async(0, move |_, ret| tx.send(ret).unwrap()).unwrap();
        assert_eq!(rx.await.unwrap(), -(libc::EBADF as isize));

        let (tx, rx) = oneshot::channel();
        fd.read_async(4, 0, move |_, ret, buf| tx.send((ret, buf)).unwrap())
            .unwrap();
        assert_eq!(rx.await.unwrap(), (4, b"data".to_vec()));

        fd.close().await.unwrap();
    });
}

#[test]
fn async_truncate_and_datasync() {
    block_on(async {
        let (volume, session) = mount();
        write_file(&session, "/f", b"0123456789").await;
        let fd = session.open(Path::new("/f"), libc::O_RDWR).await.unwrap();

        let (tx, rx) = oneshot::channel();
        fd.ftruncate_async(3, move |_, ret| tx.send(ret).unwrap()).unwrap();
        assert_eq!(rx.await.unwrap(), 0);

        let (tx, rx) = oneshot::channel();
        fd.fdatasync_async(move |fd, ret| tx.send((ret, fd.offset())).unwrap())
            .unwrap();
        assert_eq!(rx.await.unwrap(), (0, 0));
        assert_eq!(volume.fsync_calls(), 1);

        fd.close().await.unwrap();
        assert_eq!(read_file(&session, "/f").await, b"012");
    });
}

#[test]
fn oversized_async_ops_still_complete() {
    block_on(async {
        let (_, session) = mount();
        let fd = session
            .creat(Path::new("/f"), libc::O_RDWR, 0o644)
            .await
            .unwrap();

        let (tx, rx) = oneshot::channel();
        fd.pwrite_async(b"x", i64::MAX - 1, 0, move |_, ret| tx.send(ret).unwrap())
            .unwrap();
        assert_eq!(rx.await.unwrap(), -(libc::EFBIG as isize));

        let (tx, rx) = oneshot::channel();
        fd.ftruncate_async(u64::MAX, move |_, ret| tx.send(ret).unwrap())
            .unwrap();
        assert_eq!(rx.await.unwrap(), -(libc::EFBIG as isize));

        assert_eq!(fd.fstat().await.unwrap().st_size, 0);
        fd.close().await.unwrap();
    });
}

#[derive(Debug)]
struct Refuse;

impl Scheduler for Refuse {
    fn submit(&self, _: &'static str, _: BoxFuture<'static, ()>) -> async_glfs::Result<()> {
        Err(Errno::ENOMEM)
    }
}

#[test]
fn refused_submission_never_completes() {
    block_on(async {
        let volume = Arc::new(MemVolume::new("refuse"));
        let session = Session::builder()
            .scheduler(Arc::new(Refuse))
            .subvol(volume)
            .build();
        let fd = session
            .creat(Path::new("/f"), libc::O_RDWR, 0o644)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let write_calls = Arc::clone(&calls);
        let ret = fd.write_async(b"abc", 0, move |_, _| {
            let _ = write_calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ret, Err(Errno::ENOMEM));

        let sync_calls = Arc::clone(&calls);
        let ret = fd.fsync_async(move |_, _| {
            let _ = sync_calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ret, Err(Errno::ENOMEM));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&calls), 1);
        fd.close().await.unwrap();
    });
}
