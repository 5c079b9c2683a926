// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of log targets

use crate::LevelFilter;
use linkme::distributed_slice;

/// A statically declared log target.
pub struct StaticTarget {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

impl StaticTarget {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static LOG_TARGETS: [StaticTarget];

#[doc(hidden)]
#[macro_export]
macro_rules! trace_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{LOG_TARGETS, StaticTarget};
    };
}

/// Declare the log target of the calling module, its short name, default level and tags.
///
/// The expansion lives in its own `const` scope so the macro may be invoked from several
/// modules of one crate without the statics colliding.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(LOG_TARGETS)]
            static TARGET: StaticTarget = StaticTarget::new(module_path!(), $name, $level, $tags);
        };
    };
}
