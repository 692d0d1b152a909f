//! Tests for provider registration, interpreter groups and group expansion.

use std::sync::Arc;

use mockall::mock;
use rstest::{fixture, rstest};

use super::*;
use crate::error::LiftError;
use crate::platform::Platform;
use crate::test_support::StaticProvider;

mock! {
    pub Catalog {}

    impl Provider for Catalog {
        fn distribution(&self, platform: Platform) -> Option<Distribution>;
    }
}

impl std::fmt::Debug for MockCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockCatalog")
    }
}

fn id(value: &str) -> Identifier {
    Identifier::parse(value).expect("valid identifier")
}

fn cpython(version: &str) -> Distribution {
    let dist_id = id(&format!("cpython{}", version.replace('.', "")));
    Distribution::new(
        dist_id.clone(),
        File::new(format!("cpython-{version}.tar.gz")).with_key(dist_id),
    )
    .with_placeholder(id("python"), format!("python/bin/python{version}"))
}

fn static_factory(
    _id: &Identifier,
    _lazy: bool,
    _config: &serde_json::Value,
) -> Result<Arc<dyn Provider>, LiftError> {
    Ok(Arc::new(StaticProvider::default()))
}

#[fixture]
fn registry() -> ProviderRegistry {
    ProviderRegistry::builder()
        .register::<StaticProvider>("Static", static_factory)
        .expect("first registration")
        .build()
}

#[rstest]
fn registry_resolves_short_and_qualified_names(registry: ProviderRegistry) {
    let qualified = std::any::type_name::<StaticProvider>();
    assert_eq!(registry.get("Static").map(|info| info.short_name.as_str()), Some("Static"));
    assert_eq!(registry.get(qualified).map(|info| info.short_name.as_str()), Some("Static"));
    assert!(registry.get("Missing").is_none());
    assert_eq!(registry.name_of(&StaticProvider::default()), "Static");
}

#[rstest]
fn registry_rejects_duplicate_short_names() {
    let err = ProviderRegistry::builder()
        .register::<StaticProvider>("Static", static_factory)
        .and_then(|builder| builder.register::<MockCatalog>("Static", static_factory))
        .expect_err("duplicate short name");
    assert!(err.message().contains("\"Static\""));
}

#[rstest]
fn registry_create_reports_unknown_providers(registry: ProviderRegistry) {
    let err = Interpreter::from_registry(
        &registry,
        id("cpython"),
        "PythonBuildStandalone",
        false,
        &serde_json::Value::Null,
    )
    .expect_err("unknown provider");
    assert!(err.is_user_error());
    assert!(err.to_string().contains("PythonBuildStandalone"));
}

#[rstest]
fn registry_creates_interpreters(registry: ProviderRegistry) {
    let interpreter =
        Interpreter::from_registry(&registry, id("cpython"), "Static", true, &serde_json::Value::Null)
            .expect("registered provider");
    assert!(interpreter.lazy);
    assert_eq!(registry.name_of(interpreter.provider.as_ref()), "Static");
}

#[test]
fn group_requires_two_distinct_members() {
    let provider: Arc<dyn Provider> = Arc::new(StaticProvider::default());
    let member = Interpreter::new(id("cpython311"), Arc::clone(&provider), false);
    let err = InterpreterGroup::create(id("cpython"), "{scie.env.PYTHON}", vec![member.clone(), member])
        .expect_err("duplicates collapse to one member");
    assert!(err.message().contains("At least two interpreters"));
}

#[test]
fn group_rejects_mixed_providers() {
    let mut catalog = MockCatalog::new();
    catalog.expect_distribution().never();
    let members = vec![
        Interpreter::new(id("cpython311"), Arc::new(StaticProvider::default()), false),
        Interpreter::new(id("cpython312"), Arc::new(catalog), false),
    ];
    let err = InterpreterGroup::create(id("cpython"), "{scie.env.PYTHON}", members)
        .expect_err("mixed providers");
    assert!(err.message().contains("same provider"));
}

#[test]
fn group_expansion_fans_out_to_resolved_members_only() {
    let platform = Platform::LinuxX86_64;
    let resolved = StaticProvider::default().with(platform, cpython("3.11"));
    let members = vec![
        Interpreter::new(id("cpython311"), Arc::new(resolved), false),
        Interpreter::new(id("cpython312"), Arc::new(StaticProvider::default()), false),
    ];
    let group = InterpreterGroup::create(id("cpython"), "{scie.env.PYTHON}", members)
        .expect("valid group");

    let (exe, env) = group
        .expand_placeholders(platform, "#{cpython:python}")
        .expect("known placeholder");

    assert_eq!(
        exe,
        "{scie.files.{scie.env.PYTHON}}/{scie.env._SCIENCE_IG_cpython_python_{scie.env.PYTHON}}"
    );
    assert_eq!(env.len(), 1);
    assert_eq!(
        env.get("_SCIENCE_IG_cpython_python_cpython311").map(String::as_str),
        Some("{cpython311}/python/bin/python3.11")
    );

    let (selector, no_env) = group
        .expand_placeholders(platform, "#{cpython} -V")
        .expect("bare form");
    assert_eq!(selector, "{scie.env.PYTHON} -V");
    assert!(no_env.is_empty());
}

#[test]
fn group_expansion_consults_each_member_once_per_macro() {
    let platform = Platform::MacosAarch64;
    let mut first = MockCatalog::new();
    first
        .expect_distribution()
        .withf(move |requested| *requested == platform)
        .times(1)
        .returning(|_| Some(cpython("3.12")));
    let mut second = MockCatalog::new();
    second.expect_distribution().times(1).returning(|_| None);

    let group = InterpreterGroup::create(
        id("py"),
        "{scie.env.PY}",
        vec![
            Interpreter::new(id("a"), Arc::new(first), false),
            Interpreter::new(id("b"), Arc::new(second), false),
        ],
    )
    .expect("same mock provider type");
    let (_, env) = group
        .expand_placeholders(platform, "#{py:python}")
        .expect("expansion");
    assert_eq!(env.keys().collect::<Vec<_>>(), vec!["_SCIENCE_IG_py_python_a"]);
}

#[test]
fn distribution_expansion_rejects_unknown_sub_paths() {
    let dist = cpython("3.12");
    let err = dist
        .expand_placeholders("#{cpython312:pip}")
        .expect_err("no pip placeholder");
    assert!(err.message().contains("\"pip\""));
    assert_eq!(
        dist.expand_placeholders("#{cpython312:python} -m venv"),
        Ok("{cpython312}/python/bin/python3.12 -m venv".to_owned())
    );
}
