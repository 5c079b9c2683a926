// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Log level control.

use ordermap::OrderMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::targets::LOG_TARGETS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Errors raised while applying a log configuration string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceCtlError {
    #[error("invalid syntax '{0}': expected tag=level")]
    Syntax(String),
    #[error("invalid level '{0}'")]
    Level(String),
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
}

#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: BTreeSet<&'static str>,
}

#[derive(Debug)]
struct TargetDb {
    default: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
}

impl TargetDb {
    fn new(default: LevelFilter) -> Self {
        let mut db = Self {
            default,
            targets: OrderMap::new(),
        };
        for target in LOG_TARGETS {
            db.register(target.target, target.name, target.level, target.tags);
        }
        db
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        // a target is always reachable through its own name
        let mut all_tags: BTreeSet<_> = tags.iter().copied().collect();
        all_tags.insert(name);
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags: all_tags,
        };
        if let Some(prior) = self.targets.insert(target, cfg) {
            warn!("Log target {} declared more than once", prior.target);
        }
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.targets.values().any(|t| t.tags.contains(tag))
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.default.to_string());
        for target in self.targets.values() {
            match format!("{}={}", target.target, target.level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => error!("Bad directive for target {}: {e}", target.target),
            }
        }
        filter
    }
}

impl Display for TargetDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "default: {}", self.default)?;
        for target in self.targets.values() {
            let tags: Vec<_> = target.tags.iter().copied().collect();
            writeln!(
                f,
                " {:<32} {:<16} {:<6} [{}]",
                target.target,
                target.name,
                target.level.to_string(),
                tags.join(",")
            )?;
        }
        Ok(())
    }
}

/// Owner of the process-wide subscriber and its reloadable filter.
pub struct LogControl {
    db: Mutex<TargetDb>,
    reload: reload::Handle<EnvFilter, Registry>,
}

impl LogControl {
    fn new() -> Self {
        let db = TargetDb::new(LevelFilter::INFO);
        let (filter, reload) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_level(true);
        // a subscriber may already exist (e.g. in tests); keep it and carry on
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .try_init()
        {
            eprintln!("tracing subscriber already installed: {e}");
        }
        Self {
            db: Mutex::new(db),
            reload,
        }
    }

    fn db(&self) -> MutexGuard<'_, TargetDb> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reload(&self, db: &TargetDb) {
        if let Err(e) = self.reload.reload(db.env_filter()) {
            error!("Failed to reload log filter: {e}");
        }
    }

    /// Initialize logging if not done already.
    pub fn init() {
        get_trace_ctl();
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db();
        if db.default != level {
            db.default = level;
            self.reload(&db);
            info!("Default log level is now {level}");
        }
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.db().default
    }

    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db();
        for target in db.targets.values_mut() {
            target.level = level;
        }
        self.reload(&db);
    }

    /// Set the level of every target carrying `tag`. Returns the number of targets changed.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> usize {
        let mut db = self.db();
        let mut changed = 0;
        for target in db.targets.values_mut() {
            if target.tags.contains(tag) && target.level != level {
                target.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(&db);
        }
        info!("Log level for tag '{tag}' set to {level} ({changed} targets changed)");
        changed
    }

    fn parse(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
        let mut result = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some((tag, level)) = item.split_once('=') else {
                return Err(TraceCtlError::Syntax(item.to_string()));
            };
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::Level(level.trim().to_string()))?;
            result.insert(tag.trim().to_string(), level);
        }
        Ok(result)
    }

    /// Apply a configuration like `default=warn,all=info,ipam=debug`.
    ///
    /// `default` sets the level of undeclared targets, `all` sets every declared target, and any
    /// other key is a tag.  Later entries override earlier ones.
    ///
    /// # Errors
    ///
    /// Fails on syntax errors, unknown levels or unknown tags; nothing is applied in that case.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse(input)?;
        {
            let db = self.db();
            if let Some(unknown) = config
                .keys()
                .filter(|k| *k != "default" && *k != "all")
                .find(|k| !db.has_tag(k))
            {
                return Err(TraceCtlError::UnknownTag(unknown.clone()));
            }
        }
        for (tag, level) in &config {
            match tag.as_str() {
                "default" => self.set_default_level(*level),
                "all" => self.set_level_all(*level),
                tag => {
                    self.set_tag_level(tag, *level);
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn target(&self, target: &str) -> Option<TargetCfg> {
        self.db().targets.get(target).cloned()
    }

    #[must_use]
    pub fn targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        self.db()
            .targets
            .values()
            .filter(|t| t.tags.contains(tag))
            .cloned()
            .collect()
    }

    /// Render the target table, as shown by `orbitd --show-log-targets`.
    #[must_use]
    pub fn dump(&self) -> String {
        self.db().to_string()
    }
}

static LOG_CONTROL: OnceLock<LogControl> = OnceLock::new();

/// Get the process-wide [`LogControl`], installing the subscriber on first use.
pub fn get_trace_ctl() -> &'static LogControl {
    LOG_CONTROL.get_or_init(LogControl::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    mod a {
        use crate::trace_target;
        trace_target!("tctl-test-a", LevelFilter::DEBUG, &["tctl-group"]);
    }

    mod b {
        use crate::trace_target;
        trace_target!("tctl-test-b", LevelFilter::ERROR, &["tctl-group"]);
    }

    const TARGET_A: &str = concat!(module_path!(), "::a");

    #[test]
    #[serial]
    fn link_time_targets_are_registered() {
        let tctl = get_trace_ctl();
        let a = tctl.target(TARGET_A).unwrap();
        assert_eq!(a.name, "tctl-test-a");
        assert!(a.tags.contains("tctl-group"));
        assert!(a.tags.contains("tctl-test-a"));
        assert_eq!(tctl.targets_by_tag("tctl-group").len(), 2);
        // the crate's own target, declared at the top of this module
        let own = tctl.targets_by_tag("tracectl");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].target, concat!(env!("CARGO_CRATE_NAME"), "::control"));
    }

    #[test]
    #[serial]
    fn tag_level_changes_every_member() {
        let tctl = get_trace_ctl();
        tctl.set_tag_level("tctl-group", LevelFilter::WARN);
        for target in tctl.targets_by_tag("tctl-group") {
            assert_eq!(target.level, LevelFilter::WARN);
        }
    }

    #[test]
    #[serial]
    fn setup_from_string() {
        let tctl = get_trace_ctl();
        tctl.setup_from_string("default=error, tctl-test-a=trace")
            .unwrap();
        assert_eq!(tctl.default_level(), LevelFilter::ERROR);
        assert_eq!(tctl.target(TARGET_A).unwrap().level, LevelFilter::TRACE);
        tctl.set_default_level(LevelFilter::INFO);
    }

    #[test]
    #[serial]
    fn bad_strings_are_rejected() {
        let tctl = get_trace_ctl();
        assert!(matches!(
            tctl.setup_from_string("nonsense"),
            Err(TraceCtlError::Syntax(_))
        ));
        assert!(matches!(
            tctl.setup_from_string("default=loud"),
            Err(TraceCtlError::Level(_))
        ));
        assert!(matches!(
            tctl.setup_from_string("no-such-tag=info"),
            Err(TraceCtlError::UnknownTag(_))
        ));
    }
}
