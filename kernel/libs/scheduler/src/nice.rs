// SPDX-License-Identifier: MPL-2.0

use crate::SchedError;

/// The weight of a task with the nice value 0.
pub const WEIGHT_0: u64 = 1024;

/// The scheduling nice value.
///
/// It is an integer in the range of [-20, 19]. A task with a smaller nice
/// value gets a bigger weight and is more favorable in scheduling.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Nice(i8);

impl Nice {
    /// The most favorable nice value.
    pub const MIN: Self = Nice(-20);
    /// The least favorable nice value.
    pub const MAX: Self = Nice(19);

    /// Returns the nice value as an integer.
    pub const fn value(self) -> i8 {
        self.0
    }
}

impl TryFrom<i8> for Nice {
    type Error = SchedError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SchedError::InvalidNice)
        }
    }
}

impl From<Nice> for i8 {
    fn from(value: Nice) -> Self {
        value.0
    }
}

/// Converts a nice value to a load weight.
pub const fn nice_to_weight(nice: Nice) -> u64 {
    // Calculated by the formula below:
    //
    //     weight = 1024 * 1.25^(-nice)
    //
    // Every increment of the nice value results in 12.5% change of the
    // CPU load weight.
    const FACTOR_NUMERATOR: u64 = 5;
    const FACTOR_DENOMINATOR: u64 = 4;

    const NICE_TO_WEIGHT: [u64; 40] = const {
        let mut ret = [0; 40];

        let mut index = 0;
        let mut nice = Nice::MIN.0;
        while nice <= Nice::MAX.0 {
            ret[index] = match nice {
                0 => WEIGHT_0,
                nice @ 1.. => {
                    let numerator = FACTOR_DENOMINATOR.pow(nice as u32);
                    let denominator = FACTOR_NUMERATOR.pow(nice as u32);
                    WEIGHT_0 * numerator / denominator
                }
                nice => {
                    let numerator = FACTOR_NUMERATOR.pow((-nice) as u32);
                    let denominator = FACTOR_DENOMINATOR.pow((-nice) as u32);
                    WEIGHT_0 * numerator / denominator
                }
            };

            index += 1;
            nice += 1;
        }
        ret
    };

    NICE_TO_WEIGHT[(nice.0 + 20) as usize]
}
