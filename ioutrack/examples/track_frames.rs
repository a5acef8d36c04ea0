use ioutrack::{AssociationMethod, Bbox, MultiTracker, Observation, TrackerConfig};

fn main() -> anyhow::Result<()> {
    let config = TrackerConfig {
        max_age: 3,
        association: AssociationMethod::Hungarian,
        ..TrackerConfig::default()
    };
    let mut tracker = MultiTracker::new(config);

    // Two cars moving right; the second leaves after frame 4
    for frame in 1..=10 {
        let dx = 4.0 * frame as f32;
        let mut observations = vec![Observation::new(
            Bbox::new(10.0 + dx, 10.0, 50.0 + dx, 40.0),
            "car",
            0.9,
        )];
        if frame <= 4 {
            observations.push(Observation::new(
                Bbox::new(200.0 + dx, 120.0, 260.0 + dx, 170.0),
                "truck",
                0.8,
            ));
        }

        let tracks = tracker.step(&observations)?;
        println!("Frame {frame}: {} tracks", tracks.len());
        for t in &tracks {
            println!(
                "  #{} {} {} (hits {}, missed {})",
                t.id, t.class_label, t.bbox, t.hits, t.time_since_update
            );
        }
    }
    Ok(())
}
