//! M/M/1 queue demo.
//!
//! Customers arrive with exponential inter-arrival times, wait for a single
//! server, and leave after an exponential service time. Prints server
//! utilization and waiting times next to the analytic values.
//!
//! Usage: `vesper-demo [config.toml]`. Set `RUST_LOG=vesper_core=debug` to
//! follow every lifecycle transition.

use std::path::Path;

use tracing::info;
use vesper_core::component::Script;
use vesper_core::config::SimConfig;
use vesper_core::engine::Environment;
use vesper_core::generator::ComponentGenerator;
use vesper_core::resource::Request;

const ARRIVAL_MEAN: f64 = 1.25;
const SERVICE_MEAN: f64 = 1.0;
const HORIZON: f64 = 10_000.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::load(Path::new(&path))?,
        None => SimConfig::default(),
    };
    info!(seed = config.seed, "building model");

    let mut env = Environment::new(config);
    let server = env.create_resource("server", 1.0)?;
    let arrivals = ComponentGenerator::new(
        |rng| rng.exponential(ARRIVAL_MEAN),
        move |env, n| {
            let service = env.rng().exponential(SERVICE_MEAN);
            env.spawn(
                format!("customer.{n}"),
                Script::new()
                    .then(move |env, me| env.request(me, Request::on(server)))
                    .then(move |env, me| env.hold(me, service))
                    .then(move |env, me| env.release(me, server, None)),
            )
        },
    );
    let doors = env.spawn("arrivals", arrivals)?;

    let summary = env.run_until(HORIZON)?;
    info!(steps = summary.steps_run, now = summary.ended_at, "done");

    let stats = env.resource(server).map(|r| r.statistics(env.now()));
    let Some(stats) = stats else {
        return Err("server resource vanished".into());
    };
    let rho = SERVICE_MEAN / ARRIVAL_MEAN;
    let wait = stats.requesters.length_of_stay;

    println!("M/M/1 over {HORIZON} time units ({} steps)", summary.steps_run);
    println!("  arrivals created      {}", env.components().count() - 2);
    println!(
        "  utilization           {:.3}  (analytic {:.3})",
        stats.occupancy_timeline.mean, rho
    );
    println!(
        "  mean wait in queue    {:.3}  (analytic {:.3})",
        wait.mean,
        rho * SERVICE_MEAN / (1.0 - rho)
    );
    println!(
        "  mean queue length     {:.3}  (analytic {:.3})",
        stats.requesters.length_timeline.mean,
        rho * rho / (1.0 - rho)
    );
    println!("  fingerprint           {:016x}", env.fingerprint());
    if let Some(c) = env.component(doors) {
        println!("  generator state       {:?}", c.state());
    }
    Ok(())
}
