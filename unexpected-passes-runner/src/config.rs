// Copyright (c) The unexpected-passes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the unexpected-pass finder.
//!
//! Configuration is layered: the embedded default config is read first, followed by an optional
//! user config file.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::get_num_cpus,
    querier::QuerySettings,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Overall configuration for the finder.
#[derive(Clone, Debug)]
pub struct FinderConfig {
    config_file: Option<Utf8PathBuf>,
    query: QueryConfig,
}

impl FinderConfig {
    /// The default location of the config within the current directory.
    pub const CONFIG_PATH: &'static str = ".config/unexpected-passes.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config.
    ///
    /// If `config_file` is specified, it must exist. Otherwise, [`Self::CONFIG_PATH`] is read
    /// relative to `cwd` if it exists.
    pub fn from_sources(
        cwd: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (path, required) = match config_file {
            Some(path) => (path.to_owned(), true),
            None => (cwd.join(Self::CONFIG_PATH), false),
        };

        let builder = Self::make_default_config().add_source(
            File::new(path.as_str(), FileFormat::Toml).required(required),
        );
        let config_file = (required || path.exists()).then_some(path);
        let error_path = config_file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from("<default config>"));

        let (deserialized, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(error_path.clone(), kind))?;

        if !ignored.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {error_path}: {}",
                ignored.into_iter().collect::<Vec<_>>().join(", "),
            );
        }

        deserialized
            .query
            .validate()
            .map_err(|kind| ConfigParseError::new(error_path.clone(), kind))?;

        Ok(Self {
            config_file,
            query: deserialized.query,
        })
    }

    /// The user config file that was read, if any.
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }

    /// The `[query]` section of the config.
    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(FinderConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: FinderConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FinderConfigDeserialize {
    query: QueryConfig,
}

/// The `[query]` section of the config.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct QueryConfig {
    /// The `bq` binary to run.
    pub bq_binary: String,

    /// The billing project queries run under.
    pub project: String,

    /// The number of recent builds to look at per builder.
    pub num_samples: usize,

    /// Whether tests are discovered first and then queried in chunks.
    pub large_query_mode: bool,

    /// The maximum number of rows a single query may return.
    pub max_rows: usize,

    /// The number of results each query in large query mode aims for.
    pub target_results_per_query: usize,

    /// The total number of attempts made while rate-limited.
    pub max_query_tries: usize,

    /// The delay between starting successive queries of a batch.
    #[serde(with = "humantime_serde")]
    pub query_delay: Duration,

    /// The number of concurrent queries per logical CPU.
    pub io_threads_per_cpu: usize,
}

impl QueryConfig {
    /// Converts this config into query settings.
    pub fn to_settings(&self) -> QuerySettings {
        let mut settings = QuerySettings::new(&self.project);
        settings
            .set_bq_binary(&self.bq_binary)
            .set_num_samples(self.num_samples)
            .set_large_query_mode(self.large_query_mode)
            .set_max_rows(self.max_rows)
            .set_target_results_per_query(self.target_results_per_query)
            .set_max_query_tries(self.max_query_tries)
            .set_query_delay(self.query_delay)
            .set_io_threads(get_num_cpus().saturating_mul(self.io_threads_per_cpu));
        settings
    }

    fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        let must_be_positive = [
            ("query.num-samples", self.num_samples),
            ("query.max-query-tries", self.max_query_tries),
            ("query.io-threads-per-cpu", self.io_threads_per_cpu),
        ];
        for (key, value) in must_be_positive {
            if value == 0 {
                return Err(ConfigParseErrorKind::InvalidValue {
                    key,
                    reason: "must be greater than 0",
                });
            }
        }
        Ok(())
    }
}
