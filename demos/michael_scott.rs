//! Producer/consumer run on the lock-free and the blocking queue: the master
//! only dequeues while every other unit enqueues.
//!
//! `cargo run --example michael_scott -- [units] [items per producer]`

use std::env;
use std::time::{Duration, Instant};

use pgas_reclaim::counter::{Counter, Placement};
use pgas_reclaim::prelude::*;

fn main() -> Result<(), Error> {
    let mut args = env::args().skip(1).map(|arg| arg.parse::<usize>().ok());
    let units = args.next().flatten().unwrap_or(4).max(2);
    let items = args.next().flatten().unwrap_or(10_000);

    let mut config = Config::load_from_env()?;
    config.reclaim.capacity = config.reclaim.capacity.max(items + 1);

    let config = &config;
    let elapsed = produce_consume::<HazardPointers, _>(units, items, |unit| {
        let queue = MsQueue::<u64, HazardPointers, _>::new(unit, config)?;
        Ok(Queue::Lockfree(queue))
    })?;
    println!("{:>16}: {:?}", "michael-scott", elapsed);

    let elapsed = produce_consume::<FreeList, _>(units, items, |unit| {
        let queue = BlockingQueue::<u64, FreeList, _>::new(unit, config)?;
        Ok(Queue::Blocking(queue))
    })?;
    println!("{:>16}: {:?}", "blocking", elapsed);

    Ok(())
}

enum Queue<R: Reclaim> {
    Lockfree(MsQueue<u64, R, Unit>),
    Blocking(BlockingQueue<u64, R, Unit>),
}

impl<R: Reclaim> Queue<R> {
    fn enqueue(&mut self, value: u64) -> Result<(), Error> {
        match self {
            Queue::Lockfree(queue) => queue.enqueue(value),
            Queue::Blocking(queue) => queue.enqueue(value),
        }
    }

    fn dequeue(&mut self) -> Option<u64> {
        match self {
            Queue::Lockfree(queue) => queue.dequeue(),
            Queue::Blocking(queue) => queue.dequeue(),
        }
    }

    fn destroy(self) {
        match self {
            Queue::Lockfree(queue) => queue.destroy(),
            Queue::Blocking(queue) => queue.destroy(),
        }
    }
}

fn produce_consume<R, F>(units: usize, items: usize, build: F) -> Result<Duration, Error>
where
    R: Reclaim,
    F: Fn(&Unit) -> Result<Queue<R>, Error> + Sync,
{
    let results = World::run(&WorldConfig::new(units), |unit| -> Result<_, Error> {
        let mut queue = build(&unit)?;
        // counts the producers that are done, starting at 1
        let done = match Counter::new(&unit, Placement::Master) {
            Ok(done) => done,
            Err(err) => {
                queue.destroy();
                return Err(err);
            }
        };

        let start = Instant::now();
        let mut failed = None;
        if unit.is_master() {
            let producers = (units - 1) as u64;
            loop {
                if queue.dequeue().is_some() {
                    continue;
                }

                if done.load() == 1 + producers {
                    // producers finish their last enqueue before signalling
                    while queue.dequeue().is_some() {}
                    break;
                }
            }
        } else {
            for i in 0..items {
                if let Err(err) = queue.enqueue(i as u64) {
                    failed = Some(err);
                    break;
                }
            }
            done.increment();
        }

        unit.barrier();
        let elapsed = start.elapsed();
        done.destroy();
        queue.destroy();
        match failed {
            Some(err) => Err(err),
            None => Ok(elapsed),
        }
    });

    results.into_iter().try_fold(Duration::ZERO, |max, res| res.map(|elapsed| elapsed.max(max)))
}
