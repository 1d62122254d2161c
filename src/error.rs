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

//! Error type for vcp operations.

use strum_macros::EnumIter;

/// VCP error.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// There is no more work to do.
    #[default]
    Done,

    /// The configuration is invalid. Raised before the control loop starts,
    /// e.g. a zero measurement interval, an unset or implausible link
    /// capacity, or an unknown control law.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state, e.g. a hold-down timer fired in the wrong phase or a
    /// load measurement covered zero elapsed time.
    InvalidState(String),

    /// A feedback field carried a value outside of the defined 3-level code.
    InvalidFeedback(u16),

    /// The packet is not of the kind expected by the operation.
    InvalidPacket,

    /// The provided buffer is too short.
    BufferTooShort,
}

impl Error {
    /// Return true if the error is a configuration error raised at setup.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn config_errors() {
        for err in Error::iter() {
            match err {
                Error::InvalidConfig(_) => assert!(err.is_config_error()),
                _ => assert!(!err.is_config_error()),
            }
        }
    }

    #[test]
    fn display() {
        use std::error::Error as StdError;

        let e = Error::InvalidConfig("capacity unset".into());
        assert_eq!(format!("{}", e), "InvalidConfig(\"capacity unset\")");
        assert!(e.source().is_none());

        let e = Error::InvalidFeedback(7);
        assert_eq!(format!("{}", e), "InvalidFeedback(7)");
    }
}
