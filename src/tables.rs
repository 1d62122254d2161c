// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lookup tables shared by routers and senders.
//!
//! The tables are computed once by [`VcpTables::new`] and handed to each
//! load estimator and rate controller as an immutable value.

use std::sync::Arc;

use crate::packet::LoadCode;

/// Low load factor threshold in percent.
pub const LOW_LOAD_THRESHOLD: u16 = 80;

/// High load factor threshold in percent.
pub const HIGH_LOAD_THRESHOLD: u16 = 100;

/// Number of anchor windows.
const NUM_WIN: usize = 8;

/// Number of table entries per decade of window size.
const BIN_SIZE: usize = 90;

/// Number of entries in each window-indexed table.
pub const NUM_XI_INDEX: usize = (NUM_WIN - 1) * BIN_SIZE;

/// Anchor windows in packets.
const WIN: [f64; NUM_WIN] = [1.0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7];

/// MI parameter at the anchor windows.
const MI_ANCHORS: [f64; NUM_WIN] = [1.0, 0.5, 0.2, 0.1, 0.064, 0.044, 0.032, 0.024];

/// AI limiter at the anchor windows.
const AI_LIMITER_ANCHORS: [f64; NUM_WIN] = [0.1, 0.06, 0.04, 0.02, 0.01, 0.006, 0.004, 0.002];

/// Upper bound of the target utilization.
pub const MAX_TARGET_UTILIZATION: f64 = 0.999;

/// Lower bound of the target utilization.
pub const MIN_TARGET_UTILIZATION: f64 = 0.100;

/// Number of measurement intervals the target utilization adjustment is
/// spread over.
const NUM_T_RHO: f64 = 10.0;

/// Target utilization per capacity decade, starting at 1 Kbps.
const TARGET_UTILIZATION_BANDS: [(f64, f64); 10] = [
    (1e3, 0.80),
    (1e4, 0.84),
    (1e5, 0.88),
    (1e6, 0.90),
    (1e7, 0.92),
    (1e8, 0.94),
    (1e9, 0.95),
    (1e10, 0.96),
    (1e11, 0.97),
    (1e12, 0.98),
];

/// How a table value is interpolated between two anchor windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpolation {
    /// Linear in log10(window).
    Log,

    /// Power law between the two anchors.
    Geometric,
}

/// Target utilization of a link and the step used to adjust it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetUtilization {
    /// Fraction of the capacity routers try to keep busy.
    pub target: f64,

    /// Adjustment step of the target utilization.
    pub step: f64,
}

/// Immutable lookup tables.
#[derive(Debug, Clone)]
pub struct VcpTables {
    /// Load factor thresholds in percent.
    load_factor_thresholds: [u16; 2],

    /// MI parameter indexed by window.
    mi: Vec<f64>,

    /// AI limiter indexed by window.
    ai_limiter: Vec<f64>,
}

impl VcpTables {
    /// Build all tables.
    pub fn new() -> Self {
        let mut mi = Vec::with_capacity(NUM_XI_INDEX);
        let mut ai_limiter = Vec::with_capacity(NUM_XI_INDEX);

        let mut base_win = 1.0;
        let mut step = 0.1;
        for _ in 0..(NUM_XI_INDEX / BIN_SIZE) {
            for offset in 0..BIN_SIZE {
                let win = base_win + step * offset as f64;
                mi.push(interpolate(&MI_ANCHORS, Interpolation::Log, win));
                ai_limiter.push(interpolate(
                    &AI_LIMITER_ANCHORS,
                    Interpolation::Geometric,
                    win,
                ));
            }
            base_win *= 10.0;
            step *= 10.0;
        }

        VcpTables {
            load_factor_thresholds: [LOW_LOAD_THRESHOLD, HIGH_LOAD_THRESHOLD],
            mi,
            ai_limiter,
        }
    }

    /// Build the tables behind a shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The low load factor threshold in percent.
    pub fn low_threshold(&self) -> u16 {
        self.load_factor_thresholds[0]
    }

    /// The high load factor threshold in percent.
    pub fn high_threshold(&self) -> u16 {
        self.load_factor_thresholds[1]
    }

    /// Quantize a load factor in percent into a 2-bit code.
    pub fn encode(&self, load_factor: f64) -> LoadCode {
        if load_factor < self.load_factor_thresholds[0] as f64 {
            LoadCode::Low
        } else if load_factor < self.load_factor_thresholds[1] as f64 {
            LoadCode::High
        } else {
            LoadCode::Over
        }
    }

    /// MI parameter for the given window.
    pub fn mi_param(&self, cwnd: f64) -> f64 {
        self.mi[window_index(cwnd)]
    }

    /// AI limiter for the given window.
    pub fn ai_limiter(&self, cwnd: f64) -> f64 {
        self.ai_limiter[window_index(cwnd)]
    }

    /// Target utilization for a link of the given capacity in bits/sec.
    pub fn target_utilization(&self, capacity: f64) -> TargetUtilization {
        let target = TARGET_UTILIZATION_BANDS
            .iter()
            .take_while(|(min_capacity, _)| capacity >= *min_capacity)
            .last()
            .map_or(TARGET_UTILIZATION_BANDS[0].1, |(_, target)| *target)
            .clamp(MIN_TARGET_UTILIZATION, MAX_TARGET_UTILIZATION);

        TargetUtilization {
            target,
            step: (MAX_TARGET_UTILIZATION - target) / NUM_T_RHO,
        }
    }
}

impl Default for VcpTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a congestion window onto a table index.
///
/// The tables hold 90 entries per decade: 1.0..9.9 in steps of 0.1,
/// 10..99 in steps of 1, 100..990 in steps of 10, and so on.
pub fn window_index(cwnd: f64) -> usize {
    let w = cwnd as u64;
    let idx = if w < 1 {
        0
    } else if w < 10 {
        (cwnd * 10.0 + 0.5) as usize - 10
    } else if w < 100 {
        80 + (cwnd + 0.5) as usize
    } else if w < 1_000 {
        170 + (w / 10) as usize
    } else if w < 10_000 {
        260 + (w / 100) as usize
    } else if w < 100_000 {
        350 + (w / 1_000) as usize
    } else if w < 1_000_000 {
        440 + (w / 10_000) as usize
    } else if w < 10_000_000 {
        530 + (w / 100_000) as usize
    } else {
        NUM_XI_INDEX - 1
    };

    idx.min(NUM_XI_INDEX - 1)
}

/// Interpolate a table value at `win` from the anchor values.
fn interpolate(anchors: &[f64; NUM_WIN], mode: Interpolation, win: f64) -> f64 {
    if win < WIN[0] {
        return anchors[0];
    }
    if win >= WIN[NUM_WIN - 1] {
        return anchors[NUM_WIN - 1];
    }

    // Anchor decade containing the window.
    let i = (1..NUM_WIN).find(|&i| win < WIN[i]).unwrap_or(NUM_WIN - 1);
    let xi_0 = anchors[i - 1];
    let xi_1 = anchors[i];
    let decade = (i - 1) as f64;

    match mode {
        Interpolation::Log => xi_0 - (xi_0 - xi_1) * (win.log10() - decade),
        Interpolation::Geometric => {
            let exponent = (xi_0 / xi_1).log10();
            xi_0 * (win / 10f64.powf(decade)).powf(-exponent)
        }
    }
}
