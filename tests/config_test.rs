use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use stratus::config::loader::StackSource;
use stratus::config::parser::{load_config, parse_config};
use stratus::config::validator::validate;
use stratus::executor::actions::Command;
use tempfile::TempDir;

const NETWORK: &str = r#"
project:
  name: "acme"
  settings:
    region: "eu-west-1"
    max_concurrency: 4
  stacks:
    dev/vpc:
      template_path: "templates/vpc.yaml"
      parameters:
        Cidr: "10.0.0.0/16"
        Zones: [a, b, c]
        Public: true
      tags:
        team: network
    dev/subnets:
      template_path: "templates/subnets.yaml"
      dependencies:
        - dev/vpc
    dev/app:
      template_path: "/abs/app.yaml"
      stack_name: "acme-application"
      region: "us-east-1"
      dependencies:
        - dev/subnets
    dev/sandbox:
      ignore: true
    prod/vpc:
      template_path: "templates/vpc.yaml"
"#;

#[test]
fn test_parse_valid_config() {
    let config = parse_config(NETWORK).expect("Should parse valid config");
    assert_eq!(config.project.name, "acme");
    assert_eq!(config.project.stacks.len(), 5);
    assert_eq!(config.project.settings.max_concurrency, Some(4));
    assert_eq!(config.project.settings.aws_binary, "aws");
    assert_eq!(config.project.settings.max_retries, 3);
    assert_eq!(
        config.project.stacks["dev/subnets"].dependencies,
        vec!["dev/vpc"]
    );
    assert!(config.project.stacks["dev/sandbox"].ignore);
    validate(&config).expect("Should validate");
}

#[test]
fn test_minimal_config() {
    let config = parse_config("project:\n  name: tiny\n").unwrap();
    assert!(config.project.stacks.is_empty());
    assert_eq!(config.project.settings.retry_delay_ms, 500);
    assert!(!config.project.settings.ignore_dependencies);
}

#[test]
fn test_invalid_yaml_rejected() {
    assert!(parse_config("project: [unclosed").is_err());
    assert!(parse_config("stacks: {}").is_err());
}

#[test]
fn test_unknown_dependency_rejected() {
    let config = parse_config(
        r#"
project:
  name: "broken"
  stacks:
    app:
      dependencies: [db]
"#,
    )
    .unwrap();

    let err = validate(&config).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Stack 'app' depends on 'db', which does not exist"
    );
}

#[test]
fn test_zero_max_concurrency_rejected() {
    let config = parse_config(
        r#"
project:
  name: "zero"
  settings:
    max_concurrency: 0
"#,
    )
    .unwrap();

    let err = validate(&config).unwrap_err();
    assert!(err.to_string().contains("max_concurrency"));
}

#[test]
fn test_bad_stack_names_rejected() {
    for name in ["\"dev//vpc\"", "\"/vpc\"", "\"my vpc\""] {
        let yaml = format!("project:\n  name: bad\n  stacks:\n    {}: {{}}\n", name);
        let config = parse_config(&yaml).unwrap();
        assert!(validate(&config).is_err(), "{} should be rejected", name);
    }
}

#[test]
fn test_stack_source_resolves_stacks() {
    let config = parse_config(NETWORK).unwrap();
    let source = StackSource::from_config(&config, Path::new("/work")).unwrap();

    assert_eq!(source.project(), "acme");
    assert_eq!(source.graph().len(), 5);

    let vpc = source.graph().get("dev/vpc").unwrap();
    assert_eq!(vpc.external_name, "acme-dev-vpc");
    assert_eq!(
        vpc.template_path.as_deref(),
        Some(Path::new("/work/templates/vpc.yaml"))
    );
    assert_eq!(vpc.parameters["Zones"], "a,b,c");
    assert_eq!(vpc.parameters["Public"], "true");
    assert_eq!(vpc.tags["team"], "network");
    assert_eq!(vpc.region, None);

    let app = source.graph().get("dev/app").unwrap();
    assert_eq!(app.external_name, "acme-application");
    assert_eq!(app.template_path.as_deref(), Some(Path::new("/abs/app.yaml")));
    assert_eq!(app.region.as_deref(), Some("us-east-1"));

    assert!(source.graph().get("dev/sandbox").unwrap().ignore);
}

#[test]
fn test_stack_source_rejects_unknown_dependency() {
    let config = parse_config(
        r#"
project:
  name: "broken"
  stacks:
    app:
      dependencies: [db]
"#,
    )
    .unwrap();
    assert!(StackSource::from_config(&config, Path::new(".")).is_err());
}

#[test]
fn test_command_stacks_by_path() {
    let config = parse_config(NETWORK).unwrap();
    let source = StackSource::from_config(&config, Path::new(".")).unwrap();

    let mut dev: Vec<String> = source
        .command_stacks("dev")
        .iter()
        .map(|s| s.name.clone())
        .collect();
    dev.sort();
    assert_eq!(dev, vec!["dev/app", "dev/sandbox", "dev/subnets", "dev/vpc"]);

    assert_eq!(source.command_stacks("prod/vpc").len(), 1);
    assert_eq!(source.command_stacks(".").len(), 5);
    assert!(source.command_stacks("staging").is_empty());
}

#[test]
fn test_plan_options_overrides() {
    let config = parse_config(NETWORK).unwrap();
    let source = StackSource::from_config(&config, Path::new(".")).unwrap();

    let options = source.plan_options(None, false);
    assert_eq!(options.max_concurrency, NonZeroUsize::new(4));
    assert!(!options.ignore_dependencies);

    let options = source.plan_options(NonZeroUsize::new(1), true);
    assert_eq!(options.max_concurrency, NonZeroUsize::new(1));
    assert!(options.ignore_dependencies);
}

#[test]
fn test_plan_from_source() {
    let config = parse_config(NETWORK).unwrap();
    let source = StackSource::from_config(&config, Path::new(".")).unwrap();
    let mut plan = source.plan("dev/app", source.plan_options(None, false));

    let order = plan.resolve(Command::Launch, false).unwrap();
    let names: Vec<Vec<&str>> = order
        .batches()
        .iter()
        .map(|batch| batch.iter().map(|s| s.name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["dev/vpc"], vec!["dev/subnets"], vec!["dev/app"]]);
}

#[test]
fn test_load_directory_merges_files() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("a-network.yaml"),
        "project:\n  name: merged\n  stacks:\n    vpc:\n      template_path: vpc.yaml\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("b-app.yml"),
        "project:\n  name: ignored\n  stacks:\n    app:\n      dependencies: [vpc]\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not yaml").unwrap();

    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.project.name, "merged");
    assert_eq!(config.project.stacks.len(), 2);

    let source = StackSource::load(dir.path()).unwrap();
    let vpc = source.graph().get("vpc").unwrap();
    assert_eq!(vpc.template_path.as_deref(), Some(dir.path().join("vpc.yaml").as_path()));
    assert_eq!(vpc.external_name, "merged-vpc");
}

#[test]
fn test_load_directory_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("one.yaml"),
        "project:\n  name: dup\n  stacks:\n    vpc: {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("two.yaml"),
        "project:\n  name: dup\n  stacks:\n    vpc: {}\n",
    )
    .unwrap();

    let err = load_config(dir.path()).unwrap_err();
    assert!(err.to_string().contains("Duplicate stack 'vpc'"));
}

#[test]
fn test_load_missing_path() {
    let dir = TempDir::new().unwrap();
    assert!(load_config(&dir.path().join("nope.yaml")).is_err());
    assert!(load_config(dir.path()).is_err());
}
