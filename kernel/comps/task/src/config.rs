// SPDX-License-Identifier: MPL-2.0

//! Scheduler configuration.
//!
//! The configuration is read from the kernel command line. The recognized
//! arguments are:
//!
//! - `sched.policy=fifo|rr|cfs`: the scheduling policy;
//! - `sched.rr_slice=N`: the Round-Robin time slice, in ticks (`N >= 1`);
//! - `sched.cfs_granularity=N`: how many ticks the running task may get
//!   ahead of the fairest ready task under CFS before being preempted.

use alloc::boxed::Box;
use core::{num::NonZeroU64, str::FromStr};

use log::warn;
use scheduler::{
    BaseScheduler, CfsScheduler, FifoScheduler, RRScheduler, WEIGHT_0, vruntime_delta,
};

use crate::prelude::*;

/// The scheduling policies.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PolicyKind {
    /// First-in, first-out without timer preemption.
    Fifo,
    /// FIFO with a fixed time slice per turn.
    RoundRobin,
    /// Weighted fair sharing by virtual runtime.
    #[default]
    Cfs,
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fifo" => Ok(Self::Fifo),
            "rr" => Ok(Self::RoundRobin),
            "cfs" => Ok(Self::Cfs),
            _ => Err(Error::InvalidConfig),
        }
    }
}

/// The configuration of a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SchedConfig {
    /// The policy of the ready queue.
    pub policy: PolicyKind,
    /// The Round-Robin time slice, in ticks.
    pub rr_time_slice: NonZeroU64,
    /// The CFS preemption granularity, in ticks at the default weight.
    pub cfs_granularity: u64,
}

impl SchedConfig {
    const DEFAULT_RR_TIME_SLICE: NonZeroU64 = match NonZeroU64::new(5) {
        Some(slice) => slice,
        None => unreachable!(),
    };

    /// Returns the default configuration with another policy.
    pub fn with_policy(policy: PolicyKind) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Parses the scheduler arguments out of a kernel command line.
    ///
    /// Arguments that do not start with `sched.`, and those following `--`,
    /// are ignored. Unknown `sched.` arguments are ignored with a warning. A known argument with a
    /// bad value fails the whole parsing with [`Error::InvalidConfig`].
    pub fn from_cmdline(cmdline: &str) -> Result<Self> {
        let mut config = Self::default();

        for arg in split_arg(cmdline) {
            // Everything after "--" is for the init process.
            if arg == "--" {
                break;
            }
            let Some(option) = arg.strip_prefix("sched.") else {
                continue;
            };
            let Some((key, value)) = option.split_once('=') else {
                warn!("[sched] ignore kernel argument without value: {}", arg);
                continue;
            };
            let value = value.trim_matches('"');
            match key {
                "policy" => config.policy = value.parse()?,
                "rr_slice" => {
                    config.rr_time_slice = value.parse().map_err(|_| Error::InvalidConfig)?
                }
                "cfs_granularity" => {
                    config.cfs_granularity = value.parse().map_err(|_| Error::InvalidConfig)?
                }
                _ => warn!("[sched] ignore unknown kernel argument: {}", arg),
            }
        }

        Ok(config)
    }

    /// Creates an empty ready queue of the configured policy.
    pub fn build_policy<P: Send + Sync + 'static>(&self) -> Box<dyn BaseScheduler<P>> {
        match self.policy {
            PolicyKind::Fifo => Box::new(FifoScheduler::new()),
            PolicyKind::RoundRobin => Box::new(RRScheduler::new(self.rr_time_slice)),
            PolicyKind::Cfs => Box::new(CfsScheduler::with_granularity(vruntime_delta(
                WEIGHT_0,
                self.cfs_granularity,
            ))),
        }
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            rr_time_slice: Self::DEFAULT_RR_TIME_SLICE,
            cfs_granularity: 0,
        }
    }
}

// Splits the command line string by spaces but preserves
// the ones that are protected by double quotes (`"`).
fn split_arg(input: &str) -> impl Iterator<Item = &str> {
    let mut inside_quotes = false;

    input
        .split(move |c: char| {
            if c == '"' {
                inside_quotes = !inside_quotes;
            }

            !inside_quotes && c.is_whitespace()
        })
        .filter(|arg| !arg.is_empty())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedConfig::from_cmdline("").unwrap();
        assert_eq!(config, SchedConfig::default());
        assert_eq!(config.policy, PolicyKind::Cfs);
        assert_eq!(config.rr_time_slice.get(), 5);
        assert_eq!(config.cfs_granularity, 0);
    }

    #[test]
    fn parse_sched_arguments() {
        let config = SchedConfig::from_cmdline(
            "console=ttyS0  sched.policy=fifo sched.rr_slice=\"8\" sched.policy=rr init=/bin/sh -- sched.policy=cfs",
        )
        .unwrap();
        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert_eq!(config.rr_time_slice.get(), 8);
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let config =
            SchedConfig::from_cmdline("sched.bogus=1 sched.verbose sched.cfs_granularity=2");
        assert_eq!(config.unwrap().cfs_granularity, 2);
    }

    #[test]
    fn bad_values_are_rejected() {
        for cmdline in [
            "sched.policy=edf",
            "sched.rr_slice=0",
            "sched.rr_slice=-1",
            "sched.cfs_granularity=x",
        ] {
            assert_eq!(
                SchedConfig::from_cmdline(cmdline),
                Err(Error::InvalidConfig),
                "{cmdline}"
            );
        }
    }

    #[test]
    fn build_every_policy() {
        for (policy, name) in [
            (PolicyKind::Fifo, "fifo"),
            (PolicyKind::RoundRobin, "rr"),
            (PolicyKind::Cfs, "cfs"),
        ] {
            let rq = SchedConfig::with_policy(policy).build_policy::<()>();
            assert_eq!(rq.name(), name);
            assert!(rq.is_empty());
        }
    }
}
