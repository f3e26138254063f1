//! Ring all-reduce over crossbeam channels.

use super::backend::CollectiveBackend;
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use crossbeam::channel::{unbounded, Receiver, Sender};

/// A CPU collective backend connecting replica threads in a ring.
///
/// Rank `r` sends to rank `r + 1` and receives from rank `r - 1`
/// (mod world size). `all_reduce_sum` runs the two-phase ring algorithm:
/// a scatter-reduce pass leaves each rank owning one fully reduced chunk,
/// an all-gather pass circulates the reduced chunks until every rank
/// holds the complete sum. Channels are typed, so no byte reinterpretation
/// is involved, and unbounded, so sends never block and the ring cannot
/// deadlock.
pub struct CpuBackend<T> {
    rank: usize,
    world_size: usize,
    left_rx: Receiver<Vec<T>>,
    right_tx: Sender<Vec<T>>,
}

impl<T: TensorElem> CpuBackend<T> {
    pub fn new(
        rank: usize,
        world_size: usize,
        left_rx: Receiver<Vec<T>>,
        right_tx: Sender<Vec<T>>,
    ) -> Self {
        Self {
            rank,
            world_size,
            left_rx,
            right_tx,
        }
    }

    /// Wires a complete ring and returns one backend per rank, in rank
    /// order. Hand each backend to its replica thread.
    pub fn ring(world_size: usize) -> Vec<CpuBackend<T>> {
        let (txs, mut rxs): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded()).unzip();

        // Channel r carries rank r -> rank r + 1, so rank r's inbound
        // receiver is channel (r - 1) mod world.
        rxs.rotate_right(1);

        txs.into_iter()
            .zip(rxs)
            .enumerate()
            .map(|(rank, (right_tx, left_rx))| CpuBackend::new(rank, world_size, left_rx, right_tx))
            .collect()
    }

    fn send(&self, payload: Vec<T>) -> Result<()> {
        self.right_tx
            .send(payload)
            .map_err(|_| TensorError::Distributed("ring peer disconnected on send".to_string()))
    }

    fn recv(&self) -> Result<Vec<T>> {
        self.left_rx
            .recv()
            .map_err(|_| TensorError::Distributed("ring peer disconnected on recv".to_string()))
    }
}

impl<T: TensorElem> CollectiveBackend<T> for CpuBackend<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce_sum<const RANK: usize>(
        &self,
        tensor: &Tensor<T, RANK, Cpu>,
    ) -> Result<Tensor<T, RANK, Cpu>> {
        if self.world_size <= 1 {
            return Ok(tensor.clone());
        }

        let mut data = tensor.data().to_vec();
        let total = data.len();
        let chunk = total.div_ceil(self.world_size);
        let world = self.world_size as isize;
        let rank = self.rank as isize;

        let chunk_bounds = |idx: usize| {
            let start = (idx * chunk).min(total);
            (start, (start + chunk).min(total))
        };

        // Phase 1: scatter-reduce. At step s, rank r sends chunk
        // (r - s) mod world and folds the incoming chunk (r - s - 1) mod
        // world into its buffer. After world-1 steps, each rank owns one
        // fully reduced chunk.
        for step in 0..self.world_size - 1 {
            let send_idx = (rank - step as isize).rem_euclid(world) as usize;
            let recv_idx = (rank - step as isize - 1).rem_euclid(world) as usize;

            let (start, end) = chunk_bounds(send_idx);
            self.send(data[start..end].to_vec())?;

            let incoming = self.recv()?;
            let (recv_start, _) = chunk_bounds(recv_idx);
            for (i, v) in incoming.into_iter().enumerate() {
                if recv_start + i < total {
                    data[recv_start + i] += v;
                }
            }
        }

        // Phase 2: all-gather. Circulate the reduced chunks; incoming
        // data overwrites instead of accumulating.
        for step in 0..self.world_size - 1 {
            let send_idx = (rank - step as isize + 1).rem_euclid(world) as usize;
            let recv_idx = (rank - step as isize).rem_euclid(world) as usize;

            let (start, end) = chunk_bounds(send_idx);
            self.send(data[start..end].to_vec())?;

            let incoming = self.recv()?;
            let (recv_start, _) = chunk_bounds(recv_idx);
            for (i, v) in incoming.into_iter().enumerate() {
                if recv_start + i < total {
                    data[recv_start + i] = v;
                }
            }
        }

        Tensor::new(data, *tensor.shape())
    }
}
