// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Exclusive auto/manual option resolution.
//!
//! Optimization, quantization and calibration can each be configured from
//! a named preset ("auto") or from an explicit option map ("manual"). When
//! both are present the preset is applied and the manual options are
//! ignored.

/// The side of an exclusive choice that was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusive<A, M> {
    Auto(A),
    Manual(M),
}

/// Picks the active variant of an auto/manual pair.
///
/// `manual` is `Some` only when the manual variant is enabled. Returns
/// `None` when neither side is active.
pub fn resolve_exclusive<A, M>(
    what: &str,
    auto: Option<A>,
    manual: Option<M>,
) -> Option<Exclusive<A, M>> {
    match (auto, manual) {
        (Some(auto), manual) => {
            if manual.is_some() {
                tracing::warn!("{what}: both a preset and manual options are set; using the preset");
            }
            Some(Exclusive::Auto(auto))
        }
        (None, Some(manual)) => Some(Exclusive::Manual(manual)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_wins_over_manual() {
        assert_eq!(
            resolve_exclusive("optimization", Some("O2"), Some(1)),
            Some(Exclusive::Auto("O2"))
        );
        assert_eq!(
            resolve_exclusive::<&str, _>("optimization", None, Some(1)),
            Some(Exclusive::Manual(1))
        );
        assert_eq!(resolve_exclusive::<&str, i32>("optimization", None, None), None);
    }
}
