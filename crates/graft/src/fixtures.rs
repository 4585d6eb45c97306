//! Directory-based fixture autoloading
//!
//! A fixture directory holds JSON files, each describing one plugin: optional
//! instance decorations and a set of canned routes. `load_fixtures` registers
//! one autoload plugin per descriptor through the injector, so discovered
//! fixture plugins also pass through plugin interception and can themselves
//! be substituted by name.

use crate::injector::Injector;
use graft_core::{Decoration, Error, Instance, Plugin, Result, Route};
use http::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One fixture source: a bare directory path or a full configuration
#[derive(Debug, Clone)]
pub enum Fixture {
    /// A directory, loaded with path defaults (no directory-name prefixes,
    /// depth 1)
    Dir(PathBuf),
    /// A full configuration
    Config(FixtureConfig),
}

impl Fixture {
    /// Fixture from a directory path with path defaults
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }
}

impl From<FixtureConfig> for Fixture {
    fn from(config: FixtureConfig) -> Self {
        Self::Config(config)
    }
}

impl From<&str> for Fixture {
    fn from(path: &str) -> Self {
        Self::Dir(PathBuf::from(path))
    }
}

impl From<PathBuf> for Fixture {
    fn from(path: PathBuf) -> Self {
        Self::Dir(path)
    }
}

impl From<&Path> for Fixture {
    fn from(path: &Path) -> Self {
        Self::Dir(path.to_path_buf())
    }
}

/// Configuration for loading one fixture directory
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Directory to scan
    pub dir: PathBuf,
    /// Prefix routes from a subdirectory with `/<dirname>`
    pub dir_name_route_prefix: bool,
    /// How many directory levels below `dir` to descend into
    pub max_depth: usize,
    /// Route prefix applied to everything loaded from this directory
    pub prefix: Option<String>,
}

impl FixtureConfig {
    /// Configuration with structured defaults: directory-name prefixes on,
    /// depth 2, no extra prefix
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dir_name_route_prefix: true,
            max_depth: 2,
            prefix: None,
        }
    }

    /// Set the route prefix for this directory
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the maximum directory depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enable or disable directory-name route prefixes
    pub fn with_dir_name_route_prefix(mut self, on: bool) -> Self {
        self.dir_name_route_prefix = on;
        self
    }
}

impl From<Fixture> for FixtureConfig {
    fn from(fixture: Fixture) -> Self {
        match fixture {
            // A bare path normalizes to the flat, shallow form.
            Fixture::Dir(dir) => Self {
                dir,
                dir_name_route_prefix: false,
                max_depth: 1,
                prefix: None,
            },
            Fixture::Config(config) => config,
        }
    }
}

/// An ordered sequence of fixture sources
#[derive(Debug, Clone, Default)]
pub struct Fixtures(Vec<Fixture>);

impl Fixtures {
    fn into_configs(self) -> Vec<FixtureConfig> {
        self.0.into_iter().map(FixtureConfig::from).collect()
    }
}

impl From<Fixture> for Fixtures {
    fn from(fixture: Fixture) -> Self {
        Self(vec![fixture])
    }
}

impl From<FixtureConfig> for Fixtures {
    fn from(config: FixtureConfig) -> Self {
        Self(vec![config.into()])
    }
}

impl From<&str> for Fixtures {
    fn from(path: &str) -> Self {
        Self(vec![path.into()])
    }
}

impl From<&Path> for Fixtures {
    fn from(path: &Path) -> Self {
        Self(vec![path.into()])
    }
}

impl From<PathBuf> for Fixtures {
    fn from(path: PathBuf) -> Self {
        Self(vec![path.into()])
    }
}

impl From<Vec<Fixture>> for Fixtures {
    fn from(fixtures: Vec<Fixture>) -> Self {
        Self(fixtures)
    }
}

impl FromIterator<Fixture> for Fixtures {
    fn from_iter<I: IntoIterator<Item = Fixture>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// On-disk shape of one fixture file
#[derive(Debug, Clone, Deserialize)]
struct FixtureFile {
    /// Plugin name; defaults to the file stem
    #[serde(default)]
    name: Option<String>,
    /// Instance decorations to attach
    #[serde(default)]
    decorate: BTreeMap<String, Value>,
    /// Routes to register
    #[serde(default)]
    routes: Vec<RouteFixture>,
}

#[derive(Debug, Clone, Deserialize)]
struct RouteFixture {
    #[serde(default = "default_method")]
    method: String,
    path: String,
    response: Value,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Injector {
    /// Register fixture directories against the wrapped instance
    ///
    /// Accepts one fixture source or a sequence of them. Registration is
    /// scheduled here; directory scanning runs inside the registered plugin
    /// bodies, so load errors surface through the plugin-error channel when
    /// the application is readied.
    pub async fn load_fixtures(&self, fixtures: impl Into<Fixtures>) -> Result<()> {
        for config in fixtures.into().into_configs() {
            let opts = match &config.prefix {
                Some(prefix) => json!({ "prefix": prefix }),
                None => Value::Null,
            };
            tracing::debug!(dir = %config.dir.display(), "scheduling fixture autoload");
            Instance::register(self, autoload_plugin(config), opts)?;
        }
        Ok(())
    }
}

fn autoload_plugin(config: FixtureConfig) -> Plugin {
    Plugin::new("autoload", move |ctx| {
        let config = config.clone();
        async move {
            load_dir(
                ctx.instance(),
                &config.dir,
                config.max_depth,
                config.dir_name_route_prefix,
                "",
            )
        }
    })
}

fn load_dir(
    instance: &dyn Instance,
    dir: &Path,
    depth_left: usize,
    dir_name_route_prefix: bool,
    prefix: &str,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if depth_left > 0 {
                let sub = if dir_name_route_prefix {
                    format!("{}/{}", prefix, entry.file_name().to_string_lossy())
                } else {
                    prefix.to_string()
                };
                load_dir(instance, &path, depth_left - 1, dir_name_route_prefix, &sub)?;
            }
        } else if path.extension().is_some_and(|ext| ext == "json") {
            register_fixture(instance, &path, prefix)?;
        }
    }
    Ok(())
}

fn register_fixture(instance: &dyn Instance, path: &Path, prefix: &str) -> Result<()> {
    let raw = fs::read_to_string(path)?;
    let file: FixtureFile =
        serde_json::from_str(&raw).map_err(|err| Error::fixture(path, err))?;
    let name = file.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fixture".to_string())
    });
    tracing::debug!(fixture = %path.display(), plugin = %name, "loading fixture");

    let opts = if prefix.is_empty() {
        Value::Null
    } else {
        json!({ "prefix": prefix })
    };
    instance.register(fixture_plugin(name, file), opts)?;
    Ok(())
}

fn fixture_plugin(name: String, file: FixtureFile) -> Plugin {
    Plugin::new(name, move |ctx| {
        let file = file.clone();
        async move {
            for (name, value) in &file.decorate {
                ctx.instance()
                    .decorate(name, Decoration::value(value.clone()))?;
            }
            for route in &file.routes {
                let method = Method::from_bytes(route.method.as_bytes())
                    .map_err(|err| Error::plugin("fixture", err))?;
                let response = route.response.clone();
                ctx.instance().route(Route::new(
                    method,
                    route.path.clone(),
                    move |_req| {
                        let response = response.clone();
                        async move { Ok(response) }
                    },
                ))?;
            }
            Ok(())
        }
    })
}
