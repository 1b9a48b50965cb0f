use crate::config::{CliConfig, LogFormat};
use crate::driver::Driver;
use crate::manifest::Manifest;
use crate::resource::Resource;
use crate::state::StateStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filestate_core::{
    decode_snapshot, path_digest, read_directory_data, read_file_data, Action, EnvSecret,
    OsBackend,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "filestate")]
#[command(about = "Manage local files, directories and snapshots from a declarative manifest", long_about = None)]
pub struct Cli {
    /// Driver config file (.toml or .json).
    #[arg(short, long, env = "FILESTATE_CONFIG", default_value = "filestate.config.toml")]
    pub config: PathBuf,

    /// Manifest path, overriding the config file.
    #[arg(short, long, env = "FILESTATE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// State path, overriding the config file.
    #[arg(short, long, env = "FILESTATE_STATE")]
    pub state: Option<PathBuf>,

    /// Log format, overriding the config file.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Environment variable holding the HMAC key, overriding the config file.
    #[arg(long)]
    pub key_env: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Re-read every recorded resource and save the observed state.
    Refresh,
    /// Show what apply would do.
    Plan,
    /// Converge the filesystem and state to the manifest.
    Apply,
    /// Delete every recorded resource.
    Destroy,
    /// Print the identifier of a file, or of a directory path.
    Digest {
        path: PathBuf,
        /// Treat `path` as a directory resource: SHA-256 of the path string.
        #[arg(long)]
        directory: bool,
        /// HMAC key; defaults to the key environment variable, then the
        /// unprotected-file constant.
        #[arg(long)]
        key: Option<String>,
    },
    /// Look up live data without managing it; prints JSON.
    Data {
        #[command(subcommand)]
        source: DataSource,
    },
}

#[derive(Subcommand)]
pub enum DataSource {
    /// Contents, permissions and identifier of a file.
    File {
        name: String,
        #[arg(short, long, default_value = ".")]
        directory: String,
        /// HMAC key; defaults to the key environment variable, then the
        /// unprotected-file constant.
        #[arg(long)]
        key: Option<String>,
    },
    /// Identifier, permissions and entries of a directory.
    Directory { path: String },
    /// Decode a snapshot artifact, given inline or by state address.
    Snapshot {
        #[arg(required_unless_present = "address")]
        artifact: Option<String>,
        /// Take the artifact and its compress flag from this state record.
        #[arg(long, conflicts_with = "artifact")]
        address: Option<String>,
        /// Gunzip after base64-decoding an inline artifact.
        #[arg(long)]
        decompress: bool,
    },
}

impl Cli {
    /// Config file values with command-line overrides applied. The flag
    /// reports whether the config file existed.
    pub fn load_config(&self) -> Result<(CliConfig, bool)> {
        let found = self.config.exists();
        let mut config = if found {
            CliConfig::from_file(&self.config)
                .with_context(|| format!("loading config {}", self.config.display()))?
        } else {
            CliConfig::default()
        };
        if let Some(ref manifest) = self.manifest {
            config.manifest = manifest.clone();
        }
        if let Some(ref state) = self.state {
            config.state = state.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(ref key_env) = self.key_env {
            config.key_env = key_env.clone();
        }
        Ok((config, found))
    }

    pub fn run(&self, config: &CliConfig) -> Result<()> {
        match self.command {
            Command::Refresh => self.refresh(config),
            Command::Plan => self.plan(config),
            Command::Apply => self.apply(config),
            Command::Destroy => self.destroy(config),
            Command::Digest {
                ref path,
                directory,
                ref key,
            } => self.digest(config, path, directory, key.as_deref()),
            Command::Data { ref source } => self.data(config, source),
        }
    }

    fn refresh(&self, config: &CliConfig) -> Result<()> {
        let store = StateStore::new(&config.state);
        let mut state = store.load().context("loading state")?;
        let backend = OsBackend::new();
        let secrets = EnvSecret::new(&config.key_env);
        let driver = Driver::new(&backend, &secrets);

        let removed = driver.refresh(&mut state)?;
        store.save(&state).context("saving state")?;
        for address in &removed {
            println!("removed: {}", address);
        }
        println!(
            "Refreshed {} resources ({} removed)",
            state.resources.len(),
            removed.len()
        );
        Ok(())
    }

    fn plan(&self, config: &CliConfig) -> Result<()> {
        let declared = Manifest::load(&config.manifest)
            .context("loading manifest")?
            .resources()?;
        let mut state = StateStore::new(&config.state)
            .load()
            .context("loading state")?;
        let backend = OsBackend::new();
        let secrets = EnvSecret::new(&config.key_env);
        let driver = Driver::new(&backend, &secrets);

        driver.refresh(&mut state)?;
        let changes = driver.plan(&declared, &state);
        let mut pending = 0;
        for change in &changes {
            if change.action != Action::NoOp {
                pending += 1;
            }
            println!("{:>8}  {} ({})", change.action, change.address, change.kind);
        }
        println!("Plan: {} of {} resources need changes", pending, changes.len());
        Ok(())
    }

    fn apply(&self, config: &CliConfig) -> Result<()> {
        let declared = Manifest::load(&config.manifest)
            .context("loading manifest")?
            .resources()?;
        let store = StateStore::new(&config.state);
        let mut state = store.load().context("loading state")?;
        let backend = OsBackend::new();
        let secrets = EnvSecret::new(&config.key_env);
        let driver = Driver::new(&backend, &secrets);

        driver.refresh(&mut state)?;
        store.save(&state).context("saving state")?;
        let report = driver.apply(&declared, &mut state, &store)?;
        println!(
            "Apply complete: {} created, {} updated, {} replaced, {} deleted, {} unchanged",
            report.created, report.updated, report.replaced, report.deleted, report.unchanged
        );
        Ok(())
    }

    fn destroy(&self, config: &CliConfig) -> Result<()> {
        let store = StateStore::new(&config.state);
        let mut state = store.load().context("loading state")?;
        let backend = OsBackend::new();
        let secrets = EnvSecret::new(&config.key_env);
        let driver = Driver::new(&backend, &secrets);

        let report = driver.destroy(&mut state, &store)?;
        println!("Destroy complete: {} deleted", report.deleted);
        Ok(())
    }

    fn digest(
        &self,
        config: &CliConfig,
        path: &Path,
        directory: bool,
        key: Option<&str>,
    ) -> Result<()> {
        if directory {
            println!("{}", path_digest(&path.to_string_lossy()));
            return Ok(());
        }
        let name = path
            .file_name()
            .with_context(|| format!("{} does not name a file", path.display()))?
            .to_string_lossy();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy(),
            _ => ".".into(),
        };
        let secrets = EnvSecret::new(&config.key_env);
        let data = read_file_data(
            &OsBackend::new(),
            &secrets,
            &parent,
            &name,
            key.unwrap_or_default(),
        )
        .with_context(|| format!("reading {}", path.display()))?;
        println!("{}", data.identifier);
        Ok(())
    }

    fn data(&self, config: &CliConfig, source: &DataSource) -> Result<()> {
        let backend = OsBackend::new();
        match source {
            DataSource::File {
                name,
                directory,
                key,
            } => {
                let secrets = EnvSecret::new(&config.key_env);
                let data = read_file_data(
                    &backend,
                    &secrets,
                    directory,
                    name,
                    key.as_deref().unwrap_or_default(),
                )
                .with_context(|| format!("reading {}/{}", directory, name))?;
                print_json(&data)
            }
            DataSource::Directory { path } => {
                let data = read_directory_data(&backend, path)
                    .with_context(|| format!("listing {}", path))?;
                print_json(&data)
            }
            DataSource::Snapshot {
                artifact,
                address,
                decompress,
            } => {
                let (artifact, decompress) = match address {
                    Some(address) => {
                        let state = StateStore::new(&config.state)
                            .load()
                            .context("loading state")?;
                        match state.resources.get(address) {
                            Some(Resource::FileSnapshot(s)) => (s.artifact.clone(), s.compress),
                            Some(other) => anyhow::bail!(
                                "{} is a {} resource, not a file_snapshot",
                                address,
                                other.kind()
                            ),
                            None => anyhow::bail!("{} is not in state", address),
                        }
                    }
                    None => (artifact.clone().unwrap_or_default(), *decompress),
                };
                let decoded =
                    decode_snapshot(&artifact, decompress).context("decoding snapshot")?;
                print_json(&decoded)
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
