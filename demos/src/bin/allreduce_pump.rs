//! Collective all-reduce data pump.
//!
//! Standalone exercise of the all-reduce-sum primitive: two ranks on a
//! ring, each holding a fixed 2x2 buffer, reduce them over and over.
//! Rank 0 holds ones, rank 1 holds twos, so every reduced element must be
//! 3. Runs until interrupted; rank 0 reports throughput periodically.

use drugresp::distributed::{CollectiveBackend, CpuBackend};
use drugresp::tensor;
use drugresp::tensor::{Cpu, Tensor};
use std::thread;
use std::time::Instant;

const WORLD_SIZE: usize = 2;
const REPORT_EVERY: u64 = 10_000;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    )
    .init();

    log::info!("starting {}-rank all-reduce pump", WORLD_SIZE);

    let backends = CpuBackend::<f32>::ring(WORLD_SIZE);
    thread::scope(|scope| {
        for backend in backends {
            scope.spawn(move || pump(backend));
        }
    });
}

fn pump(backend: CpuBackend<f32>) {
    let local: Tensor<f32, 2, Cpu> = if backend.rank() == 0 {
        tensor!([1.0f32, 1.0, 1.0, 1.0], [2, 2])
    } else {
        tensor!([2.0f32, 2.0, 2.0, 2.0], [2, 2])
    };
    let expected = 3.0f32;

    let start = Instant::now();
    let mut reductions: u64 = 0;

    loop {
        let reduced = backend.all_reduce_sum(&local).expect("all-reduce failed");
        assert!(
            reduced.data().iter().all(|&v| v == expected),
            "rank {}: expected {}, got {:?}",
            backend.rank(),
            expected,
            reduced.data()
        );

        reductions += 1;
        if backend.rank() == 0 && reductions % REPORT_EVERY == 0 {
            let rate = reductions as f64 / start.elapsed().as_secs_f64();
            log::info!(
                "{} reductions ({:.0}/s), latest sum {:?}",
                reductions,
                rate,
                reduced.data()
            );
        }
    }
}
