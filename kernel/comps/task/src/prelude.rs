// SPDX-License-Identifier: MPL-2.0

pub(crate) use crate::error::{Error, Result};
