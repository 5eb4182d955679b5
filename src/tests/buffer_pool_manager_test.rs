#[cfg(test)]
pub mod test {

    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use tempfile::TempDir;

    use crate::{
        buffer::buffer_pool_manager::BufferPoolManagerInstance,
        storage::disk::manager::DiskManager,
        wal::LogManager,
    };

    const POOL_SIZE: usize = 3;

    fn setup(pool_size: usize) -> (BufferPoolManagerInstance, Arc<Mutex<DiskManager>>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let disk_manager = Arc::new(Mutex::new(
            DiskManager::new(dir.path().join("test.db")).unwrap(),
        ));
        let bpm = BufferPoolManagerInstance::new(pool_size, Arc::clone(&disk_manager), None);
        (bpm, disk_manager, dir)
    }

    #[test]
    fn dirty_eviction_writes_back_exactly_once() {
        let (bpm, disk_manager, _dir) = setup(POOL_SIZE);

        let (id0, page0) = bpm.new_page().unwrap().unwrap();
        assert_eq!(id0, 0);
        {
            let mut frame = page0.write().unwrap();
            frame.data_mut()[..4].copy_from_slice(b"beef");
        }
        drop(page0);
        assert!(bpm.unpin_page(id0, true));
        assert_eq!(disk_manager.lock().unwrap().num_writes(), 0);

        // Fill the pool with pinned pages; the third one claims page
        // 0's frame and must write it back first.
        let mut held = Vec::new();
        for _ in 0..POOL_SIZE {
            held.push(bpm.new_page().unwrap().unwrap());
        }
        assert_eq!(disk_manager.lock().unwrap().num_writes(), 1);

        // Make room, then bring page 0 back in.
        let (spill_id, _) = &held[0];
        assert!(bpm.unpin_page(*spill_id, false));

        let page0 = bpm.fetch_page(0).unwrap().unwrap();
        assert_eq!(&page0.read().unwrap().data()[..4], b"beef");
        // The clean spill page went out without another write.
        assert_eq!(disk_manager.lock().unwrap().num_writes(), 1);
    }

    #[test]
    fn bytes_survive_eviction_round_trip() {
        let (bpm, _disk_manager, _dir) = setup(POOL_SIZE);

        let (id0, page0) = bpm.new_page().unwrap().unwrap();
        {
            let mut frame = page0.write().unwrap();
            for (i, byte) in frame.data_mut().iter_mut().enumerate() {
                *byte = (i % 251) as u8;
            }
        }
        drop(page0);
        assert!(bpm.unpin_page(id0, true));

        // Enough churn to cycle page 0 out of every frame.
        for _ in 0..(2 * POOL_SIZE) {
            let (page_id, _page) = bpm.new_page().unwrap().unwrap();
            assert!(bpm.unpin_page(page_id, false));
        }

        let page0 = bpm.fetch_page(id0).unwrap().unwrap();
        let frame = page0.read().unwrap();
        for (i, byte) in frame.data().iter().enumerate() {
            assert_eq!(*byte, (i % 251) as u8);
        }
    }

    #[test]
    fn eviction_respects_unpin_order() {
        let (bpm, _disk_manager, _dir) = setup(POOL_SIZE);

        for expected in 0..3 {
            let (page_id, _page) = bpm.new_page().unwrap().unwrap();
            assert_eq!(page_id, expected);
        }
        assert!(bpm.unpin_page(0, false));
        assert!(bpm.unpin_page(1, false));
        assert!(bpm.unpin_page(2, false));

        // Page 0 was unpinned first, so its frame goes first.
        let (id3, _page3) = bpm.new_page().unwrap().unwrap();
        assert_eq!(id3, 3);

        // 1 and 2 are still resident; these are hits (a miss here would
        // have evicted the other one and broken the fetch after it).
        assert!(bpm.fetch_page(1).unwrap().is_some());
        assert!(bpm.fetch_page(2).unwrap().is_some());

        // Everything is pinned now, so the displaced page cannot return.
        assert!(bpm.fetch_page(0).unwrap().is_none());
    }

    #[test]
    fn delete_then_refetch_reads_fresh_bytes() {
        let (bpm, _disk_manager, _dir) = setup(POOL_SIZE);

        let (id0, _page0) = bpm.new_page().unwrap().unwrap();
        assert!(bpm.unpin_page(id0, false));
        assert!(bpm.delete_page(id0).unwrap());

        // The id starts a fresh residency: the disk has never seen
        // page 0, so it reads as zeroes.
        let page0 = bpm.fetch_page(id0).unwrap().unwrap();
        assert!(page0.read().unwrap().data().iter().all(|byte| *byte == 0));
        drop(page0);
        assert!(bpm.unpin_page(id0, false));

        // Deleting a page nobody ever created is a success as well.
        assert!(bpm.delete_page(999).unwrap());
    }

    #[test]
    fn flush_writes_even_clean_pages() {
        let (bpm, disk_manager, _dir) = setup(POOL_SIZE);

        let (page_id, _page) = bpm.new_page().unwrap().unwrap();
        assert!(bpm.flush_page(page_id).unwrap());
        assert_eq!(disk_manager.lock().unwrap().num_writes(), 1);

        assert!(!bpm.flush_page(777).unwrap());
    }

    #[test]
    fn flush_all_persists_and_cleans_every_resident_page() {
        let (bpm, disk_manager, _dir) = setup(POOL_SIZE);

        let mut pages = Vec::new();
        for _ in 0..POOL_SIZE {
            let (page_id, page) = bpm.new_page().unwrap().unwrap();
            page.write().unwrap().data_mut()[0] = page_id as u8 + 1;
            pages.push((page_id, page));
        }
        for (page_id, _page) in &pages {
            assert!(bpm.unpin_page(*page_id, true));
        }

        bpm.flush_all_pages().unwrap();
        assert_eq!(disk_manager.lock().unwrap().num_writes(), POOL_SIZE as u32);

        for (page_id, page) in &pages {
            let frame = page.read().unwrap();
            assert!(!frame.is_dirty());
            assert_eq!(frame.data()[0], *page_id as u8 + 1);
        }
    }

    #[test]
    fn dirty_write_back_runs_the_log_flush_barrier() {
        let dir = tempfile::tempdir().unwrap();
        let disk_manager = Arc::new(Mutex::new(
            DiskManager::new(dir.path().join("test.db")).unwrap(),
        ));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(dir.path().join("test.log")).unwrap(),
        ));
        let bpm = BufferPoolManagerInstance::new(
            1,
            Arc::clone(&disk_manager),
            Some(Arc::clone(&log_manager)),
        );

        log_manager.lock().unwrap().append_record(b"update page 0");

        let (id0, page0) = bpm.new_page().unwrap().unwrap();
        page0.write().unwrap().data_mut()[0] = 1;
        drop(page0);
        assert!(bpm.unpin_page(id0, true));

        // Evicting the dirty page must push the log out first.
        let (id1, _page1) = bpm.new_page().unwrap().unwrap();
        assert_eq!(id1, 1);

        let log = log_manager.lock().unwrap();
        assert_eq!(log.persistent_lsn(), log.next_lsn());
        drop(log);
        let log_len = std::fs::metadata(dir.path().join("test.log")).unwrap().len();
        assert!(log_len > 0);
    }

    #[test]
    fn parallel_clients_share_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let disk_manager = Arc::new(Mutex::new(
            DiskManager::new(dir.path().join("test.db")).unwrap(),
        ));
        let bpm = Arc::new(BufferPoolManagerInstance::new(10, disk_manager, None));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let bpm = Arc::clone(&bpm);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    let (page_id, page) = bpm.new_page().unwrap().unwrap();
                    {
                        let mut frame = page.write().unwrap();
                        frame.data_mut()[..4].copy_from_slice(&page_id.to_le_bytes());
                    }
                    drop(page);
                    assert!(bpm.unpin_page(page_id, true));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every allocated page carries its own id, whether it is still
        // resident or has to come back from disk.
        for page_id in 0..100 {
            let page = bpm.fetch_page(page_id).unwrap().unwrap();
            assert_eq!(
                page.read().unwrap().data()[..4],
                page_id.to_le_bytes()[..],
                "page {} lost its bytes",
                page_id
            );
            drop(page);
            assert!(bpm.unpin_page(page_id, false));
        }
    }
}
