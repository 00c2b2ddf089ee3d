// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Bookkeeping for periodic element-beam corrections.
//!
//! Gridded batches are accumulated for `step` batches before the element beam
//! is applied to them as a whole; the correction uses the time in the middle
//! of those batches. The final batch of an observation is usually shorter
//! than the others, which is used to detect the end of the observation and
//! apply the correction early.

use log::trace;

use crate::constants::LAST_CHUNK_FRACTION;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementBeamCycle {
    /// The number of batches per correction.
    step: usize,

    /// The number of batches seen since the last correction.
    pub(crate) counter_times: usize,

    /// The start time of the first batch \[seconds\].
    pub(crate) t_start_obs: Option<f64>,

    /// The time span of the first batch \[seconds\].
    pub(crate) delta_time: f64,

    /// When the current cycle is expected to end \[seconds\].
    pub(crate) next_apply_time: f64,

    /// The time span of the batches in the current cycle \[seconds\].
    pub(crate) cycle_start: Option<f64>,
    pub(crate) cycle_end: f64,
}

impl ElementBeamCycle {
    pub(crate) fn new(step: usize) -> Self {
        Self {
            step: step.max(1),
            counter_times: 0,
            t_start_obs: None,
            delta_time: 0.0,
            next_apply_time: 0.0,
            cycle_start: None,
            cycle_end: 0.0,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.step);
    }

    /// Are there batches that haven't been corrected yet?
    pub(crate) fn pending(&self) -> bool {
        self.counter_times > 0
    }

    /// Note a batch spanning `t_start` to `t_end`. Returns whether the batch
    /// is the last chunk of the observation.
    fn observe(&mut self, t_start: f64, t_end: f64) -> bool {
        if self.t_start_obs.is_none() {
            self.t_start_obs = Some(t_start);
            self.delta_time = t_end - t_start;
        }
        if self.cycle_start.is_none() {
            self.cycle_start = Some(t_start);
            self.next_apply_time = t_start + self.step as f64 * self.delta_time;
        }
        self.cycle_end = t_end;
        self.counter_times += 1;

        let last_chunk = t_end - t_start < LAST_CHUNK_FRACTION * self.delta_time;
        if last_chunk {
            trace!("Batch at {t_start} is the last chunk");
        }
        last_chunk
    }

    /// End the current cycle, returning its middle time.
    fn finish(&mut self) -> Option<f64> {
        let start = self.cycle_start.take()?;
        self.counter_times = 0;
        Some(0.5 * (start + self.cycle_end))
    }

    /// Note a gridded batch. If the accumulated batches should now be
    /// corrected, the time to correct them for is returned.
    pub(crate) fn grid_batch(&mut self, t_start: f64, t_end: f64) -> Option<f64> {
        let last_chunk = self.observe(t_start, t_end);
        if self.counter_times >= self.step || last_chunk {
            self.finish()
        } else {
            None
        }
    }

    /// Note a batch about to be degridded. If the batch starts a new cycle,
    /// the expected middle time of the cycle is returned; the degridding
    /// source grid should be corrected for that time.
    pub(crate) fn degrid_batch(&mut self, t_start: f64, t_end: f64) -> Option<f64> {
        let starts_cycle = self.cycle_start.is_none();
        let last_chunk = self.observe(t_start, t_end);
        let mid = starts_cycle.then(|| 0.5 * (t_start + self.next_apply_time.max(t_end)));
        if self.counter_times >= self.step || last_chunk {
            self.finish();
        }
        mid
    }

    /// End a cycle that hasn't been corrected yet.
    pub(crate) fn flush(&mut self) -> Option<f64> {
        if self.pending() {
            self.finish()
        } else {
            None
        }
    }
}
