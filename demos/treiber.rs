//! Every unit alternates pushes and pops on a shared Treiber stack, once per
//! reclamation policy, and the master reports the elapsed time.
//!
//! `cargo run --example treiber -- [units] [ops per unit]`

use std::env;
use std::time::Instant;

use pgas_reclaim::prelude::*;

fn main() -> Result<(), Error> {
    let mut args = env::args().skip(1).map(|arg| arg.parse::<usize>().ok());
    let units = args.next().flatten().unwrap_or(4);
    let ops = args.next().flatten().unwrap_or(10_000);

    let mut config = Config::load_from_env()?;
    config.reclaim.capacity = config.reclaim.capacity.max(ops);

    run::<HazardPointers>(units, ops, &config)?;
    run::<LocalityAware>(units, ops, &config)?;
    run::<Leaking>(units, ops, &config)?;
    Ok(())
}

fn run<R: Reclaim>(units: usize, ops: usize, config: &Config) -> Result<(), Error> {
    let results = World::run(&WorldConfig::new(units), |unit| -> Result<_, Error> {
        let mut stack = TreiberStack::<u64, R, _>::new(&unit, config)?;
        let start = Instant::now();

        let mut popped = 0;
        let mut failed = None;
        for i in 0..ops {
            if let Err(err) = stack.push((unit.unit_id() * ops + i) as u64) {
                failed = Some(err);
                break;
            }

            if stack.pop().is_some() {
                popped += 1;
            }
        }

        // every unit must reach the collective teardown, even after a failure
        unit.barrier();
        let elapsed = start.elapsed();
        stack.destroy();
        match failed {
            Some(err) => Err(err),
            None => Ok((elapsed, popped)),
        }
    });

    let mut slowest = Default::default();
    let mut popped = 0;
    for res in results {
        let (elapsed, count) = res?;
        slowest = elapsed.max(slowest);
        popped += count;
    }

    println!(
        "{:>16}: {} units, {} ops each, {} pops, {:?} ({:.0} ops/s)",
        R::NAME,
        units,
        2 * ops,
        popped,
        slowest,
        (2 * ops * units) as f64 / slowest.as_secs_f64()
    );

    Ok(())
}
