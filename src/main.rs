//! Verlet Terrain demo host
//!
//! Runs the simulation headless on a synthetic 60 fps frame clock, mirrors it
//! into render buffers the way a graphical host would, and reports totals.
//!
//! Usage: `verlet-terrain [settings.json] [snapshot-out.json]`

#[cfg(not(target_arch = "wasm32"))]
mod host {
    use verlet_terrain::consts::MAX_SUBSTEPS;
    use verlet_terrain::persistence::HeightSnapshot;
    use verlet_terrain::renderer::{PointCloud, TerrainMesh};
    use verlet_terrain::settings::Settings;
    use verlet_terrain::sim::{SimPhase, SimState, TickInput, tick};

    /// Frames simulated by the demo (10 s of wall time)
    const DEMO_FRAMES: u32 = 600;
    const FRAME_DT: f32 = 1.0 / 60.0;
    /// The demo pauses for this frame range to exercise the control signal
    const PAUSE_FRAMES: std::ops::Range<u32> = 200..260;

    /// Host instance holding the simulation and its render mirrors
    struct Host {
        state: SimState,
        points: PointCloud,
        terrain_mesh: TerrainMesh,
        accumulator: f32,
        input: TickInput,
        index_rebuilds: u32,
        terrain_refreshes: u32,
    }

    impl Host {
        fn new(state: SimState) -> Self {
            Self {
                points: PointCloud::new(state.store.capacity()),
                terrain_mesh: TerrainMesh::new(&state.terrain),
                state,
                accumulator: 0.0,
                input: TickInput::default(),
                index_rebuilds: 0,
                terrain_refreshes: 0,
            }
        }

        /// Run simulation ticks for one frame
        fn update(&mut self, dt: f32) {
            let step = self.state.settings.fixed_dt;
            self.accumulator += dt.min(0.1);

            let mut substeps = 0;
            while self.accumulator >= step && substeps < MAX_SUBSTEPS {
                let input = self.input.clone();
                let report = tick(&mut self.state, &input, step);
                self.accumulator -= step;
                substeps += 1;

                // Clear one-shot inputs after processing
                self.input.pause = false;

                if self.points.sync(&self.state.store, report.indices_modified) {
                    self.index_rebuilds += 1;
                }
                if report.terrain_flushed {
                    self.terrain_mesh.refresh(&self.state.terrain);
                    self.terrain_refreshes += 1;
                }
            }
        }
    }

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let mut args = std::env::args().skip(1);
        let settings = match args.next() {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let snapshot_path = args.next();

        let mut state = SimState::from_settings(settings)?;
        state.start();
        let mut host = Host::new(state);

        for frame in 0..DEMO_FRAMES {
            if frame == PAUSE_FRAMES.start || frame == PAUSE_FRAMES.end {
                host.input.pause = true;
            }
            host.update(FRAME_DT);

            if frame % 60 == 0 && host.state.phase == SimPhase::Running {
                log::info!(
                    "t={:>5.2}s active={:>6} absorbed={:>6} buffers: {} B points, {} B terrain",
                    host.state.time_ticks as f32 * host.state.settings.fixed_dt,
                    host.state.store.len(),
                    host.state.stats.absorbed,
                    host.points.vertex_bytes().len() + host.points.index_bytes().len(),
                    host.terrain_mesh.vertex_bytes().len() + host.terrain_mesh.index_bytes().len(),
                );
            }
        }

        let stats = host.state.stats;
        println!("\nSimulated {} ticks", stats.ticks);
        println!("  spawned   {:>8}  (dropped {})", stats.spawned, stats.dropped);
        println!("  expired   {:>8}", stats.expired);
        println!("  bounced   {:>8}  (truncated {})", stats.bounced, stats.truncated);
        println!("  absorbed  {:>8}", stats.absorbed);
        println!("  lost      {:>8}", stats.lost);
        println!("  active    {:>8}", host.state.store.len());
        println!(
            "  terrain volume {:.4}, mesh refreshed {} times, index buffer rebuilt {} times",
            host.state.terrain.total_height(),
            host.terrain_refreshes,
            host.index_rebuilds
        );

        if let Some(path) = snapshot_path {
            HeightSnapshot::capture(&host.state.terrain).save(path)?;
        }
        host.state.shutdown();
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Verlet Terrain (native) starting...");

    if let Err(err) = host::run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // No browser host; the library is driven by the embedding page
}
