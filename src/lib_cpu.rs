#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::hint::black_box;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::accounting::CpuAccountant;
use crate::error::{LoadError, LoadResult};

pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
pub const MIN_BUFFER_SIZE: usize = 32;
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.99;

const CIPHER_KEY_LEN: usize = 32;
const CIPHER_SPAN: usize = 1024;
const AES_BLOCK_LEN: usize = 16;

/// Which fixed unit of work one burn iteration performs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkVariant {
    /// MD5 over the random buffer.
    #[default]
    Light,
    /// SHA-256 over the buffer plus AES-256 over its head.
    Heavy,
}

impl std::fmt::Display for WorkVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkVariant::Light => f.write_str("light"),
            WorkVariant::Heavy => f.write_str("heavy"),
        }
    }
}

impl FromStr for WorkVariant {
    type Err = LoadError;
    fn from_str(s: &str) -> LoadResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "heavy" => Ok(Self::Heavy),
            other => Err(LoadError::InvalidInput(format!("unsupported variant: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BurnResult {
    pub iterations: u64,
    pub elapsed_cpu_ms: f64,
}

/// Spins over a pre-generated random buffer until the calling thread has
/// consumed the requested CPU budget.
pub struct CpuBurner {
    data: Vec<u8>,
    accountant: CpuAccountant,
    safety_factor: f64,
}

impl CpuBurner {
    /// Fills the work buffer from the OS entropy source.
    pub fn from_entropy(
        buffer_size: usize,
        accountant: CpuAccountant,
        safety_factor: f64,
    ) -> LoadResult<Self> {
        let mut data = vec![0u8; buffer_size.max(MIN_BUFFER_SIZE)];
        OsRng
            .try_fill_bytes(&mut data)
            .map_err(|e| LoadError::Internal(format!("read entropy source: {e}")))?;
        Ok(Self::with_buffer(data, accountant, safety_factor))
    }

    #[must_use]
    pub fn with_buffer(mut data: Vec<u8>, accountant: CpuAccountant, safety_factor: f64) -> Self {
        if data.len() < MIN_BUFFER_SIZE {
            data.resize(MIN_BUFFER_SIZE, 0);
        }
        let safety_factor = if safety_factor > 0.0 && safety_factor <= 1.0 {
            safety_factor
        } else {
            DEFAULT_SAFETY_FACTOR
        };
        Self {
            data,
            accountant,
            safety_factor,
        }
    }

    #[must_use]
    pub fn accountant(&self) -> &CpuAccountant {
        &self.accountant
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    /// Executes exactly one work unit.
    pub fn work_unit(&self, variant: WorkVariant) {
        match variant {
            WorkVariant::Light => {
                black_box(Md5::digest(&self.data));
            }
            WorkVariant::Heavy => {
                black_box(Sha256::digest(&self.data));
                let cipher = Aes256::new(GenericArray::from_slice(&self.data[..CIPHER_KEY_LEN]));
                let span = self.data.len().min(CIPHER_SPAN);
                let mut blocks: Vec<Block> = self.data[..span]
                    .chunks_exact(AES_BLOCK_LEN)
                    .map(GenericArray::clone_from_slice)
                    .collect();
                cipher.encrypt_blocks(&mut blocks);
                black_box(blocks);
            }
        }
    }

    /// Burns `target_ms` of CPU time on the calling thread.
    pub fn burn(&self, target_ms: u64, variant: WorkVariant) -> LoadResult<BurnResult> {
        self.burn_cancellable(target_ms, variant, &AtomicBool::new(false))
    }

    /// Like [`CpuBurner::burn`], but checks `cancel` before every work unit.
    ///
    /// Stops once the elapsed CPU time reaches `target_ms * safety_factor`.
    /// A unit cannot be interrupted, so the result overshoots the budget by at
    /// most one unit; a budget smaller than one unit still runs one unit.
    pub fn burn_cancellable(
        &self,
        target_ms: u64,
        variant: WorkVariant,
        cancel: &AtomicBool,
    ) -> LoadResult<BurnResult> {
        if target_ms == 0 {
            return Ok(BurnResult {
                iterations: 0,
                elapsed_cpu_ms: 0.0,
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let budget = target_ms as f64 * self.safety_factor;
        let start = self.accountant.mark()?;
        let mut iterations = 0u64;
        let mut elapsed = 0.0;
        while elapsed < budget {
            if cancel.load(Ordering::Relaxed) {
                return Err(LoadError::Cancelled { iterations });
            }
            self.work_unit(variant);
            iterations += 1;
            elapsed = self.accountant.since(&start)?;
        }
        Ok(BurnResult {
            iterations,
            elapsed_cpu_ms: elapsed,
        })
    }

    /// Mean CPU milliseconds of one work unit over `samples` runs.
    pub fn calibrate(&self, variant: WorkVariant, samples: u32) -> LoadResult<f64> {
        let samples = samples.max(1);
        let start = self.accountant.mark()?;
        for _ in 0..samples {
            self.work_unit(variant);
        }
        Ok(self.accountant.since(&start)? / f64::from(samples))
    }
}
