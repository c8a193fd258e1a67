//! Lockstep Runtime
//!
//! Headless binary: first instance on the port hosts, later ones join.
//!
//! ```text
//! lockstep [settings.json]
//! ```

use anyhow::{Context, Result};
use lockstep_core::time::TICK_DURATION;
use lockstep_net::authority::negotiate;
use lockstep_net::port::Udp;
use lockstep_net::LockstepEngine;
use lockstep_services::{HeldInput, Settings};
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Lockstep v{}", lockstep_core::VERSION);

    let path = std::env::args().nth(1);
    let settings = Settings::load_or_default(path.as_deref()).context("loading settings")?;

    let negotiated = negotiate(&Udp, &settings.net).context("role negotiation")?;
    let role = negotiated.role;

    let mut engine = LockstepEngine::with_positions(role, negotiated.port)
        .with_input(HeldInput::new(&settings.runtime.hold));

    let every = settings.runtime.log_every_ticks;
    if every > 0 {
        engine.subscribe(move |event| {
            if event.tick % every == 0 {
                tracing::info!("[{}] tick {} input 0x{:016X}", event.role, event.tick, event.input.packed);
            }
        });
    }

    engine.start().context("starting engine")?;

    let deadline = settings
        .runtime
        .run_seconds
        .map(Duration::try_from_secs_f32)
        .transpose()
        .context("runtime.run_seconds")?
        .map(|run| Instant::now() + run);

    let mut last = Instant::now();
    loop {
        let now = Instant::now();
        engine.frame(now - last);
        last = now;

        if deadline.is_some_and(|d| now >= d) {
            break;
        }
        // frame pacing only; the clock catches up on oversleep
        thread::sleep(TICK_DURATION / 4);
    }

    if let Some(id) = engine.local_peer_id() {
        if let Some(pos) = engine.store().position(id) {
            tracing::info!("{} final position {:?}", id, pos);
        }
    }
    engine.shutdown();

    Ok(())
}
