//! Rendering of the `lift.json` document.

use std::collections::BTreeMap;

use color_eyre::eyre::Context;
use serde_json::{Map, Value, json};

use crate::a_scie::LoadedBinary;
use crate::build_info::BuildInfo;
use crate::error::{InputError, Result};
use crate::model::{Command, Distribution, Fetch, File, FileSource, InterpreterGroup};
use crate::platform::Platform;

/// Everything the manifest of one platform is rendered from.
pub(super) struct ManifestInputs<'a> {
    pub(super) name: &'a str,
    pub(super) description: Option<&'a str>,
    pub(super) load_dotenv: bool,
    pub(super) base: Option<&'a str>,
    pub(super) platform: Platform,
    pub(super) distributions: &'a [Distribution],
    pub(super) interpreter_groups: &'a [InterpreterGroup],
    pub(super) files: &'a [File],
    pub(super) commands: &'a [Command],
    pub(super) bindings: &'a [Command],
    pub(super) fetch_urls: &'a BTreeMap<String, String>,
    pub(super) build_info: Option<&'a BuildInfo>,
    pub(super) app_info: &'a BTreeMap<String, Value>,
    pub(super) jump: Option<&'a LoadedBinary>,
}

impl ManifestInputs<'_> {
    pub(super) fn render(&self) -> Result<String> {
        let mut boot = Map::new();
        boot.insert("commands".into(), self.render_commands(self.commands)?);
        boot.insert("bindings".into(), self.render_commands(self.bindings)?);

        let mut lift = Map::new();
        lift.insert("name".into(), json!(self.name));
        lift.insert("description".into(), json!(self.description));
        lift.insert("load_dotenv".into(), json!(self.load_dotenv));
        lift.insert(
            "files".into(),
            Value::Array(self.files.iter().map(render_file).collect()),
        );
        lift.insert("boot".into(), Value::Object(boot));
        if let Some(base) = self.base {
            lift.insert("base".into(), json!(base));
        }

        let mut scie = Map::new();
        scie.insert("lift".into(), Value::Object(lift));
        if let Some(jump) = self.jump {
            if let Some(version) = &jump.version {
                scie.insert(
                    "jump".into(),
                    json!({"version": version, "size": jump.digest.size}),
                );
            }
        }

        let mut data = Map::new();
        data.insert("scie".into(), Value::Object(scie));
        if let Some(build_info) = self.build_info {
            let current = Platform::current().unwrap_or(self.platform);
            data.insert("science".into(), build_info.to_json(current, self.app_info));
        }
        if !self.fetch_urls.is_empty() {
            data.insert(
                "ptex".into(),
                Value::Object(
                    self.fetch_urls
                        .iter()
                        .map(|(name, url)| (name.clone(), json!(url)))
                        .collect(),
                ),
            );
        }

        let document = sort_keys(Value::Object(data));
        let rendered = serde_json::to_string_pretty(&document)
            .context("failed to serialise the lift manifest")?;
        Ok(rendered)
    }

    fn render_commands(&self, commands: &[Command]) -> Result<Value> {
        let mut rendered = Map::new();
        for command in commands {
            rendered.insert(
                command.manifest_name().to_owned(),
                self.render_command(command)?,
            );
        }
        Ok(Value::Object(rendered))
    }

    fn render_command(&self, command: &Command) -> std::result::Result<Value, InputError> {
        let mut env = BTreeMap::<String, Value>::new();
        let mut expand = |text: &str| -> std::result::Result<String, InputError> {
            let mut expanded = text.to_owned();
            for distribution in self.distributions {
                expanded = distribution.expand_placeholders(&expanded)?;
            }
            for group in self.interpreter_groups {
                let (rewritten, group_env) = group.expand_placeholders(self.platform, &expanded)?;
                expanded = rewritten;
                env.extend(group_env.into_iter().map(|(k, v)| (k, Value::String(v))));
            }
            Ok(expanded)
        };

        let mut cmd = Map::new();
        cmd.insert("exe".into(), json!(expand(&command.exe)?));
        let args = command
            .args
            .iter()
            .map(|arg| expand(arg))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if !args.is_empty() {
            cmd.insert("args".into(), json!(args));
        }

        let mut declared = Vec::new();
        for (name, value) in &command.env.default {
            declared.push((name.clone(), Value::String(expand(value)?)));
        }
        for (name, value) in &command.env.replace {
            declared.push((format!("={name}"), Value::String(expand(value)?)));
        }
        env.extend(declared);
        for name in &command.env.remove_exact {
            env.insert(format!("={name}"), Value::Null);
        }
        for pattern in &command.env.remove_re {
            env.insert(pattern.clone(), Value::Null);
        }
        if !env.is_empty() {
            cmd.insert("env".into(), Value::Object(env.into_iter().collect()));
        }
        if let Some(description) = &command.description {
            cmd.insert("description".into(), json!(description));
        }
        Ok(Value::Object(cmd))
    }
}

fn render_file(file: &File) -> Value {
    let mut data = Map::new();
    data.insert("name".into(), json!(file.name));
    if let Some(key) = &file.key {
        data.insert("key".into(), json!(key.as_str()));
    }
    if let Some(digest) = &file.digest {
        data.insert("size".into(), json!(digest.size));
        data.insert("hash".into(), json!(digest.fingerprint.as_str()));
    }
    if let Some(file_type) = file.file_type {
        data.insert("type".into(), json!(file_type.as_str()));
    }
    if file.is_executable {
        data.insert("executable".into(), json!(true));
    }
    if file.eager_extract {
        data.insert("eager_extract".into(), json!(true));
    }
    match &file.source {
        FileSource::Fetch(Fetch { lazy: true, .. }) => {
            data.insert("source".into(), json!(Fetch::BINDING_NAME));
        }
        FileSource::Binding(name) => {
            data.insert("source".into(), json!(name.as_str()));
        }
        FileSource::Fetch(_) | FileSource::Local => {}
    }
    Value::Object(data)
}

/// Rebuilds objects with their keys in lexicographic order, whatever map
/// implementation `serde_json` was compiled with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, nested)| (key, sort_keys(nested)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Env, Identifier};
    use reqwest::Url;

    fn inputs<'a>(
        files: &'a [File],
        commands: &'a [Command],
        fetch_urls: &'a BTreeMap<String, String>,
        app_info: &'a BTreeMap<String, Value>,
    ) -> ManifestInputs<'a> {
        ManifestInputs {
            name: "app",
            description: None,
            load_dotenv: false,
            base: None,
            platform: Platform::LinuxX86_64,
            distributions: &[],
            interpreter_groups: &[],
            files,
            commands,
            bindings: &[],
            fetch_urls,
            build_info: None,
            app_info,
            jump: None,
        }
    }

    fn parse(rendered: &str) -> Value {
        serde_json::from_str(rendered).expect("valid json")
    }

    #[test]
    fn files_render_only_present_fields() {
        let lazy = File::new("data.bin").with_source(FileSource::Fetch(Fetch::new(
            Url::parse("https://example/data.bin").expect("url"),
            true,
        )));
        let bound = File::new("venv")
            .with_key(Identifier::parse("venv").expect("id"))
            .with_source(FileSource::Binding(Identifier::parse("install").expect("id")));

        assert_eq!(
            render_file(&lazy),
            json!({"name": "data.bin", "source": "fetch"})
        );
        assert_eq!(
            render_file(&bound),
            json!({"name": "venv", "key": "venv", "source": "install"})
        );
        assert_eq!(render_file(&File::new("tool").executable()), json!({"name": "tool", "executable": true}));
    }

    #[test]
    fn env_is_rendered_with_operator_prefixes() {
        let env = Env {
            default: BTreeMap::from([("HOME".to_owned(), "/home".to_owned())]),
            replace: BTreeMap::from([("PATH".to_owned(), "/bin".to_owned())]),
            remove_exact: ["SECRET".to_owned()].into(),
            remove_re: ["^PYTHON.*".to_owned()].into(),
        };
        let commands = [Command::new("tool").with_env(env)];
        let fetch_urls = BTreeMap::new();
        let app_info = BTreeMap::new();

        let rendered = parse(
            &inputs(&[], &commands, &fetch_urls, &app_info)
                .render()
                .expect("render"),
        );

        assert_eq!(
            rendered["scie"]["lift"]["boot"]["commands"][""]["env"],
            json!({"HOME": "/home", "=PATH": "/bin", "=SECRET": null, "^PYTHON.*": null})
        );
        assert_eq!(rendered["scie"]["lift"]["description"], Value::Null);
        assert!(rendered.get("ptex").is_none());
        assert!(rendered["scie"].get("jump").is_none());
    }

    #[test]
    fn output_is_pretty_printed_with_sorted_keys() {
        let commands = [Command::new("tool").named("run")];
        let fetch_urls = BTreeMap::from([("b".to_owned(), "https://b".to_owned())]);
        let app_info = BTreeMap::new();

        let rendered = inputs(&[], &commands, &fetch_urls, &app_info)
            .render()
            .expect("render");

        assert!(rendered.starts_with("{\n  \"ptex\": {\n    \"b\": \"https://b\"\n  },\n  \"scie\": {"));
        let lift = rendered.find("\"boot\"").expect("boot");
        let name = rendered.find("\"name\"").expect("name");
        assert!(lift < name);
    }
}
