use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, RwLock},
};

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    storage::{
        disk::manager::DiskManager,
        page::{FrameId, Page, PageId, INVALID_PAGE_ID},
    },
    utils::replacer::{LRUReplacer, Replacer},
    wal::LogManager,
};

/// A pinned page handed out by the pool. The caller may read and write
/// the contents through the lock without holding the pool latch, must
/// drop its guard before calling back into the pool, and owes exactly
/// one `unpin_page` per `new_page`/`fetch_page` that produced it.
pub type PageRef = Arc<RwLock<Page>>;

// Bookkeeping guarded by the pool latch.
struct PoolState {
    // Page id -> frame currently hosting it.
    page_table: HashMap<PageId, FrameId>,
    // Frames that hold no page at all.
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// One buffer pool instance: a fixed array of frames, a page table,
/// a free list, and an LRU replacer over the unpinned residents.
///
/// Every public operation runs under the pool latch, disk I/O
/// included, so operations serialize. Lock order is fixed: pool latch,
/// then a frame's lock, then the replacer or disk mutex.
pub struct BufferPoolManagerInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,

    // The frame array. A frame's index is its FrameId; the Arcs are
    // allocated once and live for the pool's lifetime.
    frames: Vec<PageRef>,

    latch: Mutex<PoolState>,

    replacer: Mutex<LRUReplacer<FrameId>>,

    disk_manager: Arc<Mutex<DiskManager>>,
    log_manager: Option<Arc<Mutex<LogManager>>>,
}

impl BufferPoolManagerInstance {
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
        log_manager: Option<Arc<Mutex<LogManager>>>,
    ) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk_manager, log_manager)
    }

    /// Builds one instance of a sharded pool. Page ids allocated here
    /// satisfy `id % num_instances == instance_index`.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<Mutex<DiskManager>>,
        log_manager: Option<Arc<Mutex<LogManager>>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool has at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must fall inside the instance pool"
        );

        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new())))
            .collect();

        BufferPoolManagerInstance {
            pool_size,
            num_instances,
            instance_index,
            frames,
            latch: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
                next_page_id: instance_index as PageId,
            }),
            replacer: Mutex::new(LRUReplacer::new(pool_size)),
            disk_manager,
            log_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocates a fresh page id and binds it to a frame, pinned and
    /// zeroed. `None` when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, PageRef)>> {
        let mut state = self.latch.lock().unwrap();
        let page_id = self.allocate_page(&mut state);

        let Some(frame_id) = self.acquire_victim_frame(&mut state)? else {
            // The pre-allocated id is simply abandoned; the id space is
            // unbounded within a run.
            warn!("no frame available for new page {}", page_id);
            return Ok(None);
        };

        {
            let mut frame = self.frames[frame_id].write().unwrap();
            frame.page_id = page_id;
            frame.is_dirty = false;
            frame.pin_count = 1;
            frame.reset_memory();
        }
        state.page_table.insert(page_id, frame_id);
        self.replacer.lock().unwrap().pin(frame_id);

        debug!("new page {} bound to frame {}", page_id, frame_id);
        Ok(Some((page_id, Arc::clone(&self.frames[frame_id]))))
    }

    /// Returns the requested page, pinned, loading it from disk when it
    /// is not resident. `None` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageRef>> {
        let mut state = self.latch.lock().unwrap();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id].write().unwrap().pin_count += 1;
            self.replacer.lock().unwrap().pin(frame_id);
            debug!("fetch hit for page {} in frame {}", page_id, frame_id);
            return Ok(Some(Arc::clone(&self.frames[frame_id])));
        }

        let Some(frame_id) = self.acquire_victim_frame(&mut state)? else {
            warn!("no frame available to fetch page {}", page_id);
            return Ok(None);
        };

        {
            let mut frame = self.frames[frame_id].write().unwrap();
            frame.page_id = page_id;
            frame.is_dirty = false;
            let read = self
                .disk_manager
                .lock()
                .unwrap()
                .read_page(page_id, frame.data_mut());
            if let Err(err) = read {
                // The frame is unmapped at this point; hand it to the
                // free list so every frame stays accounted for.
                frame.page_id = INVALID_PAGE_ID;
                frame.pin_count = 0;
                frame.reset_memory();
                drop(frame);
                state.free_list.push_back(frame_id);
                return Err(err);
            }
            frame.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        self.replacer.lock().unwrap().pin(frame_id);

        debug!("fetched page {} from disk into frame {}", page_id, frame_id);
        Ok(Some(Arc::clone(&self.frames[frame_id])))
    }

    /// Releases one pin and folds the caller's dirty report into the
    /// frame. The dirty flag is sticky for the residency: a true report
    /// is never erased by a later false one. Returns false when the
    /// page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.latch.lock().unwrap();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let mut frame = self.frames[frame_id].write().unwrap();
        frame.is_dirty |= is_dirty;
        if frame.pin_count == 0 {
            return false;
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.lock().unwrap().unpin(frame_id);
        }
        true
    }

    /// Writes the resident page's current bytes to disk, pinned or
    /// not. The write is unconditional; a clean page is written all the
    /// same. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.latch.lock().unwrap();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        let mut frame = self.frames[frame_id].write().unwrap();
        self.write_back(&frame)?;
        frame.is_dirty = false;
        debug!("flushed page {} from frame {}", page_id, frame_id);
        Ok(true)
    }

    /// Flushes every resident page. No ordering among pages beyond
    /// what the disk manager provides.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.latch.lock().unwrap();

        for (&page_id, &frame_id) in state.page_table.iter() {
            let mut frame = self.frames[frame_id].write().unwrap();
            self.write_back(&frame)?;
            frame.is_dirty = false;
            debug!("flushed page {} from frame {}", page_id, frame_id);
        }
        Ok(())
    }

    /// Drops a page's residency and returns its frame to the free
    /// list. A page that is not resident deletes trivially; a pinned
    /// one refuses.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock().unwrap();
        self.deallocate_page(page_id);

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        {
            let mut frame = self.frames[frame_id].write().unwrap();
            if frame.pin_count != 0 {
                debug!(
                    "delete of page {} refused, pin count {}",
                    page_id, frame.pin_count
                );
                return Ok(false);
            }
            if frame.is_dirty {
                self.write_back(&frame)?;
            }
            frame.page_id = INVALID_PAGE_ID;
            frame.is_dirty = false;
            frame.pin_count = 0;
            frame.reset_memory();
        }
        state.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        self.replacer.lock().unwrap().pin(frame_id);

        debug!("deleted page {}, frame {} freed", page_id, frame_id);
        Ok(true)
    }

    /// Pin count of a resident page, for callers that only need to
    /// observe.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.latch.lock().unwrap();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].read().unwrap().pin_count)
    }

    // Finds a frame to host a page: the free list first, then the
    // replacer. An evicted occupant is written back (if dirty) and
    // unmapped before the frame id is handed out.
    fn acquire_victim_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            debug!("frame {} taken from the free list", frame_id);
            return Ok(Some(frame_id));
        }

        // With every resident frame pinned there is no point consulting
        // the replacer, and a broken policy could not hand us a pinned
        // frame either.
        let all_pinned = self
            .frames
            .iter()
            .all(|frame| frame.read().unwrap().pin_count > 0);
        if all_pinned {
            debug!("every frame is pinned");
            return Ok(None);
        }

        let Some(frame_id) = self.replacer.lock().unwrap().victim() else {
            debug!("replacer has no victim to offer");
            return Ok(None);
        };

        let frame = self.frames[frame_id].read().unwrap();
        if frame.is_dirty {
            if let Err(err) = self.write_back(&frame) {
                // The eviction did not happen: re-register the frame and
                // leave its mapping alone.
                drop(frame);
                self.replacer.lock().unwrap().unpin(frame_id);
                return Err(err);
            }
        }
        let old_page_id = frame.page_id;
        drop(frame);
        state.page_table.remove(&old_page_id);

        debug!("evicted page {} from frame {}", old_page_id, frame_id);
        Ok(Some(frame_id))
    }

    // Flushes one frame's bytes to disk under its current page id. The
    // log flush barrier runs first so no data page overtakes its log
    // records.
    fn write_back(&self, frame: &Page) -> Result<()> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.lock().unwrap().flush()?;
        }
        self.disk_manager
            .lock()
            .unwrap()
            .write_page(frame.page_id, &frame.data)
    }

    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;
        self.validate_page_id(page_id);
        page_id
    }

    fn deallocate_page(&self, page_id: PageId) {
        // A notification for the storage layers below; the id space is
        // never handed back to the allocator.
        debug!("page {} deallocated", page_id);
    }

    fn validate_page_id(&self, page_id: PageId) {
        // Allocated ids must map back onto this instance.
        assert_eq!(
            page_id % self.num_instances as PageId,
            self.instance_index as PageId
        );
    }
}
