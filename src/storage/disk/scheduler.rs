use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use log::error;
use parking_lot::Mutex;

use super::channel::Channel;
use super::DiskManager;
use crate::error::Result;
use crate::storage::page::PageId;

/// Number of worker shards. All requests for one page hash to the same
/// shard, which executes them in submission order.
pub const NUM_WORKERS: usize = 4;

/// Payload of a disk request. Writes carry an owned copy of the page
/// image; reads carry a shared scratch buffer the worker fills before
/// fulfilling the completion.
pub enum DiskData {
    Write(Vec<u8>),
    Read(Arc<Mutex<Vec<u8>>>),
}

/// A request to perform disk I/O on one page. `done` is a single-shot
/// completion fulfilled by the worker: true on success, false if the
/// disk manager reported an error.
pub struct DiskRequest {
    pub data: DiskData,
    pub page_id: PageId,
    pub done: mpsc::Sender<bool>,
}

struct WorkerShard {
    queue: Arc<Channel<DiskRequest>>,
    handle: Option<JoinHandle<()>>,
}

/// Asynchronous disk request dispatcher. `schedule` places a request on
/// the main queue without blocking; a dispatcher thread hands each
/// request to the worker shard `page_id % NUM_WORKERS`, so requests for
/// the same page are serialized while different pages proceed in
/// parallel. Dropping the scheduler drains both tiers: no request
/// accepted before the drop is lost.
pub struct DiskScheduler {
    request_queue: Arc<Channel<DiskRequest>>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<WorkerShard>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Result<DiskScheduler> {
        let mut workers = Vec::with_capacity(NUM_WORKERS);
        for i in 0..NUM_WORKERS {
            let queue = Arc::new(Channel::new());
            let worker_queue = Arc::clone(&queue);
            let disk_manager = Arc::clone(&disk_manager);
            let handle = thread::Builder::new()
                .name(format!("disk-worker-{}", i))
                .spawn(move || Self::run_worker(worker_queue, disk_manager))?;
            workers.push(WorkerShard { queue, handle: Some(handle) });
        }

        let request_queue = Arc::new(Channel::new());
        let queue = Arc::clone(&request_queue);
        let shards: Vec<_> = workers.iter().map(|w| Arc::clone(&w.queue)).collect();
        let dispatcher = thread::Builder::new()
            .name("disk-dispatcher".to_string())
            .spawn(move || Self::run_dispatcher(queue, shards))?;

        Ok(DiskScheduler { request_queue, dispatcher: Some(dispatcher), workers })
    }

    /// Place a request on the main queue. Non-blocking; completion is
    /// signaled through the request's `done` channel.
    pub fn schedule(&self, request: DiskRequest) {
        self.request_queue.put(Some(request));
    }

    fn shard(page_id: PageId) -> usize {
        page_id as usize % NUM_WORKERS
    }

    fn run_dispatcher(queue: Arc<Channel<DiskRequest>>, shards: Vec<Arc<Channel<DiskRequest>>>) {
        while let Some(request) = queue.get() {
            shards[Self::shard(request.page_id)].put(Some(request));
        }
    }

    fn run_worker(queue: Arc<Channel<DiskRequest>>, disk_manager: Arc<dyn DiskManager>) {
        while let Some(request) = queue.get() {
            let res = match &request.data {
                DiskData::Write(image) => disk_manager.write_page(request.page_id, image),
                DiskData::Read(buf) => {
                    let mut buf = buf.lock();
                    disk_manager.read_page(request.page_id, &mut buf)
                }
            };
            let ok = match res {
                Ok(()) => true,
                Err(err) => {
                    let op = match request.data {
                        DiskData::Write(_) => "write",
                        DiskData::Read(_) => "read",
                    };
                    error!("disk {} of page {} failed: {}", op, request.page_id, err);
                    false
                }
            };
            // the submitter may have given up waiting; nothing to do then
            let _ = request.done.send(ok);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // sentinel-terminate the dispatcher first so the main queue is
        // drained into the shards, then shut the shards down
        self.request_queue.put(None);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for worker in &mut self.workers {
            worker.queue.put(None);
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
