use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request, carrying its own page buffer and a channel to
/// signal completion on.
enum DiskRequest {
    Read {
        page_id: PageId,
        reply: std::sync::mpsc::Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        reply: std::sync::mpsc::Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a background worker thread
/// fed by a bounded queue, so callers can block on completion without
/// holding pool locks across the syscall.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let shutdown_flag = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm, receiver, shutdown_flag);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads a page through the worker, blocking until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        self.submit(DiskRequest::Read { page_id, reply: tx })?;

        let buf = rx
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("worker dropped reply: {}", e)))??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes a page through the worker, blocking until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = std::sync::mpsc::channel();
        self.submit(DiskRequest::Write {
            page_id,
            data: buf,
            reply: tx,
        })?;

        rx.recv()
            .map_err(|e| SiltError::DiskScheduler(format!("worker dropped reply: {}", e)))?
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn submit(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| SiltError::DiskScheduler(format!("failed to queue request: {}", e)))
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain what is already queued before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager
                    .read_page(page_id, &mut buf[..])
                    .map(|_| buf);
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_read_write() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[100] = 255;
        scheduler.schedule_write_sync(page_id, &data).unwrap();

        let mut readback = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(page_id, &mut readback).unwrap();
        assert_eq!(readback[0], 42);
        assert_eq!(readback[100], 255);
    }

    #[test]
    fn test_scheduler_interleaved_requests() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let p1 = scheduler.disk_manager().allocate_page().unwrap();
        let p2 = scheduler.disk_manager().allocate_page().unwrap();

        scheduler.schedule_write_sync(p1, &[1u8; PAGE_SIZE]).unwrap();
        scheduler.schedule_write_sync(p2, &[2u8; PAGE_SIZE]).unwrap();

        let mut r1 = [0u8; PAGE_SIZE];
        let mut r2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(p1, &mut r1).unwrap();
        scheduler.schedule_read_sync(p2, &mut r2).unwrap();

        assert_eq!(r1[0], 1);
        assert_eq!(r2[0], 2);
    }
}
