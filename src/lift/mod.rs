//! Assembly of per-platform lift manifests and build chroots.
//!
//! For every target platform the [`Assembler`] resolves interpreter
//! distributions, applies laziness inversion, wires in the `ptex` helper for
//! lazy fetches, links file bytes into `<dest>/<platform>/` and writes
//! `<dest>/<platform>/lift.json` for the native assembler to consume.
//!
//! Platforms are independent: an export only writes inside its own chroot, so
//! callers may drive [`Assembler::export_platform`] from several threads as
//! long as the platforms differ.

mod config;
mod manifest;
mod materialize;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use tracing::{debug, info, warn};

pub use config::{FileMapping, LiftConfig};
use manifest::ManifestInputs;
use materialize::{Materializer, write_empty_zip};

use crate::a_scie::{HelperLoader, LoadedBinary, ReleaseLoader};
use crate::build_info::{AppInfo, BuildInfo};
use crate::error::{InputError, ProviderError, Result};
use crate::fetcher::Fetcher;
use crate::fs::{absolutize, ensure_dir_exists, path_occupied, recreate_dir, symlink};
use crate::model::{
    Application, Distribution, Fetch, File, FileType, Identifier, ProviderRegistry,
};
use crate::platform::Platform;

const LOG_TARGET: &str = "scie_lift::lift";

/// File name of the manifest written into each chroot.
pub const MANIFEST_FILE_NAME: &str = "lift.json";

/// Default first argument of the `fetch` binding: the manifest itself.
pub const DEFAULT_PTEX_ARGV1: &str = "{scie.lift}";

const DEFAULT_PTEX_KEY: &str = "ptex";
const EMPTY_TOTE: &str = "empty-scie-tote";

/// The result of exporting one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedManifest {
    /// The platform exported.
    pub platform: Platform,
    /// The build chroot, `<dest>/<platform>`.
    pub chroot: Utf8PathBuf,
    /// The written `lift.json`.
    pub manifest_path: Utf8PathBuf,
    /// The launcher to assemble with, when one was loaded.
    pub jump: Option<LoadedBinary>,
}

/// Compiles applications into lift manifests.
#[derive(Debug, Clone)]
pub struct Assembler {
    registry: ProviderRegistry,
    fetcher: Fetcher,
    loader: Arc<dyn HelperLoader>,
    cwd: Option<Utf8PathBuf>,
}

impl Assembler {
    /// Creates an assembler that loads helpers from their GitHub releases.
    #[must_use]
    pub fn new(registry: ProviderRegistry, fetcher: Fetcher) -> Self {
        let loader = Arc::new(ReleaseLoader::new(fetcher.clone()));
        Self {
            registry,
            fetcher,
            loader,
            cwd: None,
        }
    }

    /// Replaces the helper loader.
    #[must_use]
    pub fn with_loader(mut self, loader: impl HelperLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Sets the directory unmapped local files are looked up in; defaults to
    /// the process working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Exports every requested platform in order.
    ///
    /// `platforms`, or else [`LiftConfig::platforms`], are explicit requests;
    /// when both are empty the application's own platforms are exported and a
    /// platform some interpreter has no distribution for is skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Stops at the first platform that fails. Manifests already exported
    /// stay in place.
    pub fn export(
        &self,
        config: &LiftConfig,
        application: &Application,
        dest_dir: &Utf8Path,
        platforms: Option<&[Platform]>,
    ) -> Result<Vec<ExportedManifest>> {
        application.validate()?;
        let (targets, explicit) = match platforms.filter(|requested| !requested.is_empty()) {
            Some(requested) => (requested.to_vec(), true),
            None if !config.platforms.is_empty() => (config.platforms.clone(), true),
            None => (application.default_platforms()?, false),
        };

        let mut exported = Vec::with_capacity(targets.len());
        for platform in targets {
            if let Some(manifest) =
                self.export_platform(config, application, dest_dir, platform, explicit)?
            {
                exported.push(manifest);
            }
        }
        Ok(exported)
    }

    /// Exports a single platform.
    ///
    /// Returns `None` when the platform is implicit and some interpreter has
    /// no distribution for it. A relative `dest` is resolved against the
    /// assembler's working directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] for a missing distribution on an explicit
    /// platform, input errors for invalid laziness inversion or unmapped
    /// files, and fetch or integrity errors for eager downloads.
    pub fn export_platform(
        &self,
        config: &LiftConfig,
        application: &Application,
        dest: &Utf8Path,
        platform: Platform,
        explicit: bool,
    ) -> Result<Option<ExportedManifest>> {
        application.validate()?;
        let Some(distributions) = self.resolve_distributions(application, platform, explicit)?
        else {
            return Ok(None);
        };
        let cwd = self.cwd()?;
        let dest_dir = absolutize(&cwd, dest);
        let chroot = dest_dir.join(platform.as_str());
        recreate_dir(&chroot)?;
        debug!(target: LOG_TARGET, %platform, %chroot, "exporting lift manifest");

        let mut file_paths_by_id: BTreeMap<String, Utf8PathBuf> = config
            .file_mappings
            .iter()
            .map(|mapping| (mapping.id.clone(), mapping.resolved(&cwd)))
            .collect();

        let mut inverter = LazyInverter::new(&config.invert_lazy_ids);
        let mut requested = VecDeque::new();
        for distribution in &distributions {
            requested.push_back(inverter.apply(&distribution.file)?);
        }
        for file in &application.files {
            requested.push_back(inverter.apply(file)?);
        }
        inverter.finish()?;

        let fetches_present = requested.iter().any(File::is_lazy_fetch);
        let mut bindings = Vec::new();
        if application.ptex.is_some() || fetches_present {
            let ptex_file = self.link_ptex(application, platform, &chroot, &mut file_paths_by_id)?;
            if fetches_present {
                let argv1 = application
                    .ptex
                    .as_ref()
                    .and_then(|ptex| ptex.argv1.as_deref())
                    .unwrap_or(DEFAULT_PTEX_ARGV1);
                bindings.push(Fetch::create_binding(&ptex_file, argv1));
            }
            requested.push_front(ptex_file);
        }
        bindings.extend(application.bindings.iter().cloned());

        if requested.is_empty() {
            ensure_dir_exists(&dest_dir)?;
            let tote = dest_dir.join(format!("{EMPTY_TOTE}.zip"));
            write_empty_zip(&tote)?;
            let file = File::new(EMPTY_TOTE);
            file_paths_by_id.insert(file.id().to_owned(), tote);
            requested.push_back(file);
        }
        ensure_unique_ids(&requested)?;

        let materializer = Materializer {
            chroot: &chroot,
            dest_dir: &dest_dir,
            cwd: &cwd,
            fetcher: &self.fetcher,
            file_paths_by_id: &file_paths_by_id,
            hydrate: config.hydrate_files,
        };
        let mut fetch_urls = BTreeMap::new();
        let files = requested
            .into_iter()
            .map(|file| materializer.materialize(file, &mut fetch_urls))
            .collect::<Result<Vec<_>>>()?;

        let jump = self
            .loader
            .load_jump(platform, application.scie_jump.as_ref())?;
        let app_info = AppInfo::assemble(&config.app_info);
        let fallback_info = BuildInfo::default();
        let build_info = config
            .provenance_enabled()
            .then(|| application.build_info.as_ref().unwrap_or(&fallback_info));
        let rendered = ManifestInputs {
            name: config.app_name.as_deref().unwrap_or(&application.name),
            description: application.description.as_deref(),
            load_dotenv: application.load_dotenv,
            base: application.base.as_deref(),
            platform,
            distributions: &distributions,
            interpreter_groups: &application.interpreter_groups,
            files: &files,
            commands: &application.commands,
            bindings: &bindings,
            fetch_urls: &fetch_urls,
            build_info,
            app_info: &app_info,
            jump: jump.as_ref(),
        }
        .render()?;

        let manifest_path = chroot.join(MANIFEST_FILE_NAME);
        std::fs::write(&manifest_path, rendered)
            .with_context(|| format!("failed to write {manifest_path}"))?;
        info!(target: LOG_TARGET, %platform, manifest = %manifest_path, "exported lift manifest");
        Ok(Some(ExportedManifest {
            platform,
            chroot,
            manifest_path,
            jump,
        }))
    }

    fn cwd(&self) -> Result<Utf8PathBuf> {
        if let Some(cwd) = &self.cwd {
            return Ok(cwd.clone());
        }
        let cwd = std::env::current_dir().context("failed to read the working directory")?;
        Ok(Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
            InputError::new(format!(
                "The working directory {} is not valid UTF-8.",
                path.display()
            ))
        })?)
    }

    fn resolve_distributions(
        &self,
        application: &Application,
        platform: Platform,
        explicit: bool,
    ) -> Result<Option<Vec<Distribution>>> {
        let mut distributions = Vec::with_capacity(application.interpreters.len());
        for interpreter in &application.interpreters {
            if let Some(distribution) = interpreter.provider.distribution(platform) {
                distributions.push(distribution);
                continue;
            }
            let provider = self.registry.name_of(interpreter.provider.as_ref());
            if explicit {
                return Err(ProviderError {
                    provider,
                    platform: platform.to_string(),
                }
                .into());
            }
            warn!(
                target: LOG_TARGET,
                %platform,
                interpreter = %interpreter.id,
                %provider,
                "No compatible distribution was found; skipping the platform."
            );
            return Ok(None);
        }
        Ok(Some(distributions))
    }

    fn link_ptex(
        &self,
        application: &Application,
        platform: Platform,
        chroot: &Utf8Path,
        file_paths_by_id: &mut BTreeMap<String, Utf8PathBuf>,
    ) -> Result<File> {
        let ptex = self.loader.load_ptex(platform, application.ptex.as_ref())?;
        let link = chroot.join(&ptex.binary_name);
        if !path_occupied(&link) {
            symlink(&ptex.path, &link)?;
        }
        let key = application
            .ptex
            .as_ref()
            .and_then(|pin| pin.id.clone())
            .map_or_else(|| Identifier::parse(DEFAULT_PTEX_KEY), Ok)?;
        let file = File::new(ptex.binary_name)
            .with_key(key)
            .with_digest(ptex.digest)
            .with_type(FileType::Blob)
            .executable();
        file_paths_by_id.insert(file.id().to_owned(), link);
        Ok(file)
    }
}

/// Flips the laziness of requested file ids and tracks which were found.
struct LazyInverter<'a> {
    requested: &'a BTreeSet<String>,
    inverted: BTreeSet<String>,
}

impl<'a> LazyInverter<'a> {
    const fn new(requested: &'a BTreeSet<String>) -> Self {
        Self {
            requested,
            inverted: BTreeSet::new(),
        }
    }

    fn apply(&mut self, file: &File) -> std::result::Result<File, InputError> {
        if !self.requested.contains(file.id()) {
            return Ok(file.clone());
        }
        let flipped = file.invert_lazy()?;
        self.inverted.insert(file.id().to_owned());
        Ok(flipped)
    }

    fn finish(self) -> std::result::Result<(), InputError> {
        let missing: Vec<&str> = self
            .requested
            .difference(&self.inverted)
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InputError::new(format!(
                "The following files were not present to invert laziness for: {}",
                missing.join(", ")
            )))
        }
    }
}

fn ensure_unique_ids(files: &VecDeque<File>) -> std::result::Result<(), InputError> {
    let mut seen = BTreeSet::new();
    for file in files {
        if !seen.insert(file.id()) {
            return Err(InputError::new(format!(
                "The file id {} is used by more than one file.",
                file.id()
            )));
        }
    }
    Ok(())
}
