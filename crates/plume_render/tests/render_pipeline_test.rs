//! # Render Pipeline Integration Test
//!
//! Publishes frames through a dataset and builds draw indices from the
//! current buffer, the way a render thread would.

use std::thread;

use plume_core::{Accessor, AttributeDesc, AttributeType, Dataset, DatasetConfig, Residency};
use plume_render::sort_cull::keys::{encode_ascending, encode_descending};
use plume_render::sort_cull::radix::{comparison_sort, radix_sort, SortEntry};
use plume_render::{
    DistanceBand, Frustum, SortCullConfig, SortCullEngine, SortCullRequest, SortMode, SortPath,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn dataset(attributes: Vec<AttributeDesc>) -> Dataset {
    let config = DatasetConfig {
        name: "render".into(),
        attributes,
        ..DatasetConfig::default()
    };
    Dataset::new(&config, Residency::Host).unwrap()
}

/// Publishes one frame whose float attribute `name` holds `values`.
fn publish_floats(dataset: &mut Dataset, name: &str, values: &[f32]) {
    let accessor = Accessor::<f32>::bind(dataset.layout(), name);
    let buffer = dataset.begin_simulate().unwrap();
    buffer.allocate(values.len(), false);
    buffer.set_num_instances(values.len());
    let mut writer = accessor.writer(buffer);
    for (i, &value) in values.iter().enumerate() {
        writer.set(i, value);
    }
    dataset.end_simulate(true).unwrap();
}

/// Test: a distance band over a float attribute drops exactly the outliers.
#[test]
fn test_distance_band_over_attribute() {
    let mut dataset = dataset(vec![AttributeDesc::new("distance", AttributeType::Float)]);
    let distances = [2.0, 5.0, 7.0, 12.0, 20.0, 33.0, 48.0, 50.0, 51.0, 70.0];
    publish_floats(&mut dataset, "distance", &distances);

    let request = SortCullRequest::new()
        .with_distance_band(DistanceBand::from_attribute("distance", 5.0, 50.0));
    let current = dataset.current_data().unwrap();
    let result = SortCullEngine::default().build_for(&current, &request);

    assert_eq!(result.len(), 7);
    assert_eq!(result.culled_count, 3);
    for &index in &result.indices {
        let d = distances[index as usize];
        assert!((5.0..=50.0).contains(&d), "instance {index} at {d} should be culled");
    }
}

/// Test: descending custom sort puts the largest value first.
#[test]
fn test_custom_descending_order() {
    let mut dataset = dataset(vec![AttributeDesc::new("Weight", AttributeType::Float)]);
    publish_floats(&mut dataset, "Weight", &[0.1, 0.9, 0.5]);

    let request = SortCullRequest::new().with_sort_attribute(SortMode::CustomDescending, "Weight");
    let current = dataset.current_data().unwrap();
    let result = SortCullEngine::default().build_for(&current, &request);

    assert_eq!(result.indices, vec![1, 2, 0]);
}

/// Test: both sort paths induce the same key sequence on random keys.
#[test]
fn test_radix_and_comparison_paths_agree() {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for len in [37, 399, 400, 5_000] {
        let values: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0e4..1.0e4)).collect();

        for encode in [encode_ascending as fn(f32) -> u32, encode_descending] {
            let entries: Vec<SortEntry> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| SortEntry::new(encode(v), i as u32))
                .collect();

            let mut by_radix = entries.clone();
            let mut by_comparison = entries;
            radix_sort(&mut by_radix);
            comparison_sort(&mut by_comparison);

            let radix_keys: Vec<u32> = by_radix.iter().map(|e| e.key).collect();
            let comparison_keys: Vec<u32> = by_comparison.iter().map(|e| e.key).collect();
            assert_eq!(radix_keys, comparison_keys, "len {len}");

            let mut seen: Vec<u32> = by_radix.iter().map(|e| e.index).collect();
            seen.sort_unstable();
            assert!(seen.iter().copied().eq(0..len as u32));
        }
    }
}

/// Test: engines on either side of the threshold emit the same value order.
#[test]
fn test_engine_paths_agree_on_published_frame() {
    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<f32> = (0..2_000).map(|_| rng.gen_range(-50.0..50.0)).collect();
    let mut dataset = dataset(vec![AttributeDesc::new("Age", AttributeType::Float)]);
    publish_floats(&mut dataset, "Age", &values);

    let request = SortCullRequest::new().with_sort_attribute(SortMode::CustomAscending, "Age");
    let current = dataset.current_data().unwrap();

    let radix = SortCullEngine::new(SortCullConfig {
        radix_sort_threshold: 0,
    })
    .build_for(&current, &request);
    let comparison = SortCullEngine::new(SortCullConfig {
        radix_sort_threshold: usize::MAX,
    })
    .build_for(&current, &request);

    assert_eq!(radix.sort_path, Some(SortPath::Radix));
    assert_eq!(comparison.sort_path, Some(SortPath::Comparison));

    let ordered = |indices: &[u32]| -> Vec<f32> {
        indices.iter().map(|&i| values[i as usize]).collect()
    };
    let radix_values = ordered(&radix.indices);
    assert_eq!(radix_values, ordered(&comparison.indices));
    assert!(radix_values.windows(2).all(|w| w[0] <= w[1]));
}

/// Test: cull then sort yields exactly the passing subset in key order.
#[test]
fn test_cull_and_sort_together() {
    let mut dataset = dataset(vec![
        AttributeDesc::new("Position", AttributeType::Vec3),
        AttributeDesc::new("Visible", AttributeType::Int),
    ]);
    let position = Accessor::<[f32; 3]>::bind(dataset.layout(), "Position");
    let visible = Accessor::<i32>::bind(dataset.layout(), "Visible");

    let count = 600;
    let mut expected = Vec::new();
    {
        let buffer = dataset.begin_simulate().unwrap();
        buffer.allocate(count, false);
        buffer.set_num_instances(count);
        for i in 0..count {
            let z = (i as f32 * 7.31) % 100.0 - 20.0;
            let tag = i32::from(i % 4 != 0);
            position.writer(buffer).set(i, [1.0, -1.0, z]);
            visible.writer(buffer).set(i, tag);
            if tag == 1 && z >= 0.0 {
                expected.push((z, i as u32));
            }
        }
    }
    dataset.end_simulate(true).unwrap();

    let near = plume_render::Plane::from_point_normal([0.0; 3], [0.0, 0.0, 1.0]);
    let request = SortCullRequest::new()
        .with_visibility_tag("Visible", 1)
        .with_frustum(Frustum::from_planes(&[near]))
        .with_sort(SortMode::ViewDepth)
        .with_view([0.0; 3], [0.0, 0.0, 1.0]);

    let current = dataset.current_data().unwrap();
    let result = SortCullEngine::default().build_for(&current, &request);

    let mut got: Vec<u32> = result.indices.clone();
    got.sort_unstable();
    let mut want: Vec<u32> = expected.iter().map(|&(_, i)| i).collect();
    want.sort_unstable();
    assert_eq!(got, want);
    assert_eq!(result.culled_count, count - want.len());

    let depths = position.reader(&current);
    let ordered: Vec<f32> = result
        .indices
        .iter()
        .map(|&i| depths.get(i as usize)[2])
        .collect();
    assert!(ordered.windows(2).all(|w| w[0] >= w[1]), "not back to front");
}

/// Test: many views sort the same read guard at once.
#[test]
fn test_parallel_views_share_one_frame() {
    let mut dataset = dataset(vec![AttributeDesc::new("Position", AttributeType::Vec3)]);
    let position = Accessor::<[f32; 3]>::bind(dataset.layout(), "Position");
    {
        let buffer = dataset.begin_simulate().unwrap();
        buffer.allocate(1_000, false);
        buffer.set_num_instances(1_000);
        let mut writer = position.writer(buffer);
        for i in 0..1_000 {
            let t = i as f32;
            writer.set(i, [t.sin() * 30.0, t.cos() * 30.0, t * 0.1]);
        }
    }
    dataset.end_simulate(true).unwrap();

    let reader = dataset.reader();
    let current = reader.current_data().unwrap();
    let engine = SortCullEngine::default();
    let views = [
        [0.0, 0.0, -10.0],
        [50.0, 0.0, 0.0],
        [0.0, 50.0, 50.0],
        [-20.0, -20.0, 200.0],
    ];

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = views
            .iter()
            .map(|&origin| {
                let current = &current;
                let engine = &engine;
                scope.spawn(move || {
                    let request = SortCullRequest::new()
                        .with_sort(SortMode::ViewDistance)
                        .with_view(origin, [0.0, 0.0, 1.0]);
                    (origin, engine.build_for(current, &request))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let positions = position.reader(&current);
    for (origin, result) in results {
        assert_eq!(result.len(), 1_000);
        let distances: Vec<f32> = result
            .indices
            .iter()
            .map(|&i| {
                let p = positions.get(i as usize);
                (0..3).map(|k| (p[k] - origin[k]).powi(2)).sum::<f32>()
            })
            .collect();
        assert!(distances.windows(2).all(|w| w[0] >= w[1]));
    }
    assert_eq!(dataset.arena().read_ref_count(current.handle().index), 1);
}
