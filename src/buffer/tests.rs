use super::*;
use crate::info::AudioStreamParams;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn small_queue(count: usize) -> BufferQueue {
    // 8 kHz mono S16LE, 5 ms -> 40 frames, 80 bytes
    let params = AudioStreamParams::new(
        crate::info::SamplingRate::Hz8000,
        crate::info::EncodingType::Pcm,
        crate::info::SampleFormat::S16Le,
        crate::info::AudioChannel::Mono,
    );
    let pool = BufferPool::new(&params, Duration::from_millis(5), count).unwrap();
    BufferQueue::new(pool)
}

#[test]
fn test_initial_accounting() {
    let queue = small_queue(3);
    let acc = queue.accounting();
    assert_eq!(acc.free, 3);
    assert_eq!(acc.total, 3);
    assert!(acc.is_conserved());
    assert_eq!(queue.pool().buffer_size(), 80);
    assert_eq!(
        queue.state(),
        BufQueueState {
            num_buffers: 3,
            current_index: 0
        }
    );
}

#[test]
fn test_slot_conservation_through_moves() {
    let queue = small_queue(3);

    let mut a = queue.checkout(false).unwrap();
    assert!(queue.accounting().is_conserved());
    assert_eq!(queue.accounting().checked_out, 1);

    a.fill(&[1u8; 10]);
    queue.checkin(a, true).unwrap();
    assert_eq!(queue.state().current_index, 1);

    let slot = queue.pop_filled(Holder::Worker, Wait::NonBlocking).unwrap();
    assert_eq!(slot.len, 10);
    let acc = queue.accounting();
    assert_eq!((acc.free, acc.filled, acc.checked_out), (2, 0, 1));
    assert!(acc.is_conserved());

    queue.push_free(slot, Holder::Worker).unwrap();
    assert_eq!(queue.accounting().free, 3);
}

#[test]
fn test_checkin_rejects_null_and_foreign() {
    let queue = small_queue(2);
    assert!(queue.checkin(BufferDesc::default(), true).is_err());

    let mut desc = queue.checkout(false).unwrap();
    desc.fill(&[3u8; 12]);
    queue.checkin(desc, true).unwrap();

    // Worker cannot return a slot it never took
    let slot = queue.pop_filled(Holder::Client, Wait::NonBlocking).unwrap();
    assert!(queue.push_free(slot, Holder::Worker).is_err());
}

#[test]
fn test_empty_enqueue_goes_back_to_free() {
    let queue = small_queue(2);
    let desc = queue.checkout(false).unwrap();
    queue.checkin(desc, true).unwrap();
    assert_eq!(queue.state().current_index, 0);
    assert_eq!(queue.accounting().free, 2);
}

#[test]
fn test_flush_returns_filled() {
    let queue = small_queue(3);
    for _ in 0..2 {
        let mut d = queue.checkout(false).unwrap();
        d.fill(&[7u8; 80]);
        queue.checkin(d, true).unwrap();
    }
    assert_eq!(queue.queued_bytes(), 160);
    assert_eq!(queue.flush(), 2);
    assert_eq!(queue.queued_bytes(), 0);
    assert_eq!(queue.accounting().free, 3);
}

#[test]
fn test_read_into_spans_slots() {
    let queue = small_queue(3);
    for v in [1u8, 2] {
        let mut slot = queue.pop_free(Holder::Worker, Wait::NonBlocking).unwrap();
        slot.fill_from(&[v; 6]);
        queue.push_filled(slot, Holder::Worker).unwrap();
    }

    let mut out = [0u8; 4];
    assert_eq!(queue.read_into(&mut out, Wait::NonBlocking), 4);
    assert_eq!(out, [1, 1, 1, 1]);
    assert_eq!(queue.queued_bytes(), 8);

    let mut out = [0u8; 6];
    assert_eq!(queue.read_into(&mut out, Wait::NonBlocking), 6);
    assert_eq!(out, [1, 1, 2, 2, 2, 2]);

    let mut out = [0u8; 8];
    assert_eq!(queue.read_into(&mut out, Wait::NonBlocking), 2);
    assert_eq!(queue.accounting().free, 3);
}

#[test]
fn test_blocking_wait_cancelled_by_close() {
    let queue = Arc::new(small_queue(2));
    queue.open();
    let _a = queue.pop_free(Holder::Client, Wait::Blocking).unwrap();
    let _b = queue.pop_free(Holder::Client, Wait::Blocking).unwrap();

    let waiter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop_free(Holder::Client, Wait::Blocking).is_none())
    };
    thread::sleep(Duration::from_millis(20));
    queue.close();
    assert!(waiter.join().unwrap());
}

#[test]
fn test_blocking_read_wakes_on_data() {
    let queue = Arc::new(small_queue(2));
    queue.open();

    let reader = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut out = [0u8; 4];
            let n = queue.read_into(&mut out, Wait::Blocking);
            (n, out)
        })
    };
    thread::sleep(Duration::from_millis(10));
    let mut slot = queue.pop_free(Holder::Worker, Wait::NonBlocking).unwrap();
    slot.fill_from(&[5u8; 4]);
    queue.push_filled(slot, Holder::Worker).unwrap();

    let (n, out) = reader.join().unwrap();
    assert_eq!(n, 4);
    assert_eq!(out, [5; 4]);
}

#[test]
fn test_wait_drained() {
    let queue = Arc::new(small_queue(2));
    queue.open();
    let mut d = queue.checkout(false).unwrap();
    d.fill(&[1u8; 8]);
    queue.checkin(d, true).unwrap();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let slot = queue.pop_filled(Holder::Worker, Wait::NonBlocking).unwrap();
            queue.push_free(slot, Holder::Worker).unwrap();
        })
    };
    assert!(queue.wait_drained());
    consumer.join().unwrap();
}

#[test]
fn test_reclaim_dropped_descriptor() {
    let queue = small_queue(3);
    let desc = queue.checkout(false).unwrap();
    let capacity = desc.buf_length();
    drop(desc);
    assert_eq!(queue.accounting().checked_out, 1);
    assert!(queue.has_client_checkout());

    assert_eq!(queue.reclaim_client(), 1);
    let accounting = queue.accounting();
    assert_eq!(accounting.free, 3);
    assert_eq!(accounting.checked_out, 0);
    assert!(accounting.is_conserved());
    assert!(!queue.has_client_checkout());

    // Reclaimed slot is usable at full capacity
    let mut descs: Vec<_> = (0..3).map(|_| queue.checkout(false).unwrap()).collect();
    assert!(descs.iter().all(|d| d.buf_length() == capacity));
    for d in descs.drain(..) {
        queue.checkin(d, false).unwrap();
    }
    assert_eq!(queue.reclaim_client(), 0);
}

#[test]
fn test_reallocate_requires_all_slots_home() {
    let queue = small_queue(3);
    let desc = queue.checkout(false).unwrap();
    let bigger = BufferPool::new(
        &AudioStreamParams::cd_quality(),
        Duration::from_millis(10),
        4,
    )
    .unwrap();
    assert!(queue.reallocate(bigger).is_err());

    queue.checkin(desc, false).unwrap();
    queue.reallocate(bigger).unwrap();
    assert_eq!(queue.accounting().total, 4);
    assert_eq!(queue.pool().buffer_size(), 441 * 4);
}

#[test]
fn test_frame_counters() {
    let queue = small_queue(2);
    assert_eq!(queue.advance_transferred(40), 40);
    assert_eq!(queue.advance_transferred(40), 80);
    assert_eq!(queue.advance_client(10), 10);
    queue.reset_counters();
    assert_eq!(queue.transferred_frames(), 0);
    assert_eq!(queue.client_frames(), 0);
}
