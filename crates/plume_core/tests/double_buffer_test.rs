//! # Double Buffer Integration Test
//!
//! A simulation thread publishes frames while render threads read them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use plume_core::{
    Accessor, AttributeDesc, AttributeType, Dataset, DatasetConfig, Residency,
};

fn particle_config() -> DatasetConfig {
    DatasetConfig {
        name: "integration".into(),
        attributes: vec![
            AttributeDesc::new("Position", AttributeType::Vec3),
            AttributeDesc::new("Frame", AttributeType::Int),
        ],
        ..DatasetConfig::default()
    }
}

/// Test: a reader keeps a buffer alive and unchanged across a reset.
#[test]
fn test_reader_survives_reset() {
    let mut dataset = Dataset::new(&particle_config(), Residency::Host).unwrap();
    let position = Accessor::<[f32; 3]>::bind(dataset.layout(), "Position");

    let written = dataset.begin_simulate().unwrap() as *const _;
    dataset.allocate(100, false).unwrap();
    {
        let buffer = dataset.destination_mut().unwrap();
        buffer.set_num_instances(100);
        let mut writer = position.writer(buffer);
        for i in 0..100 {
            writer.set(i, [i as f32, 0.0, -(i as f32)]);
        }
    }
    dataset.end_simulate(true).unwrap();

    let reader = dataset.reader();
    let current = reader.current_data().unwrap();
    assert!(std::ptr::eq(written, &*current));
    assert_eq!(dataset.arena().read_ref_count(current.handle().index), 1);

    dataset.reset().unwrap();
    assert!(reader.current_data().is_none());

    // A full simulate pass must not reuse the held buffer.
    dataset.begin_simulate().unwrap();
    dataset.allocate(10, false).unwrap();
    dataset.end_simulate(true).unwrap();
    assert_ne!(
        dataset.current_data().unwrap().handle().index,
        current.handle().index
    );

    assert_eq!(current.num_instances(), 100);
    let values = position.reader(&current);
    for i in 0..100 {
        assert_eq!(values.get(i), [i as f32, 0.0, -(i as f32)]);
    }

    drop(current);
    assert_eq!(dataset.flush_retired(), 1);
}

/// Test: render threads never observe a torn frame.
#[test]
fn test_concurrent_readers_see_whole_frames() {
    const FRAMES: i32 = 500;
    const INSTANCES: usize = 64;

    let mut dataset = Dataset::new(&particle_config(), Residency::Host).unwrap();
    let frame = Accessor::<i32>::bind(dataset.layout(), "Frame");
    let reader = dataset.reader();
    let done = Arc::new(AtomicBool::new(false));

    let renderers: Vec<_> = (0..4)
        .map(|_| {
            let reader = reader.clone();
            let frame = frame.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last_seen = 0;
                let mut reads = 0_u64;
                while !done.load(Ordering::Acquire) {
                    let Some(current) = reader.current_data() else {
                        continue;
                    };
                    let values = frame.reader(&current);
                    let first = values.get(0);
                    for i in 1..values.num_instances() {
                        assert_eq!(values.get(i), first, "torn frame");
                    }
                    assert!(first >= last_seen, "frames went backwards");
                    last_seen = first;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for n in 1..=FRAMES {
        let buffer = dataset.begin_simulate().unwrap();
        buffer.allocate(INSTANCES, false);
        buffer.set_num_instances(INSTANCES);
        let mut writer = frame.writer(buffer);
        for i in 0..INSTANCES {
            writer.set(i, n);
        }
        dataset.end_simulate(true).unwrap();
    }
    done.store(true, Ordering::Release);

    for renderer in renderers {
        renderer.join().unwrap();
    }
    let last = dataset.current_data().unwrap();
    assert_eq!(frame.reader(&last).get(INSTANCES - 1), FRAMES);
    assert!(dataset.buffers_in_service() <= DatasetConfig::default().max_buffers);
}
