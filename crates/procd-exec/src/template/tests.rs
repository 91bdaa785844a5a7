use rstest::{fixture, rstest};

use super::*;
use crate::resolver::{CONTEXT_RESOLVER, LITERAL_RESOLVER};

#[fixture]
fn kinds() -> ActionKinds {
    ActionKinds::default()
}

#[fixture]
fn resolvers() -> ResolverRegistry {
    ResolverRegistry::default()
}

fn load(text: &str) -> Result<TemplateRegistry, TemplateError> {
    TemplateRegistry::from_toml_str_for(
        text,
        OsFamily::Linux,
        &ActionKinds::default(),
        &ResolverRegistry::default(),
    )
}

fn argv_of(text: &str, name: &str, context: &ExecutionContext) -> Vec<String> {
    let registry = load(text).expect("templates load");
    registry
        .get(name)
        .expect("template exists")
        .argv(context, &ResolverRegistry::default())
        .expect("argv resolves")
}

const ECHO: &str = r#"
[[process]]
name = "echo"
command = { linux = "echo", windows = "cmd /c echo" }

[[process.parameter]]
value = "${MSG}"
if_defined = "MSG"
"#;

#[test]
fn resolves_guarded_parameters() {
    let context = ExecutionContext::new().with("MSG", "hello world");
    assert_eq!(argv_of(ECHO, "echo", &context), ["echo", "hello world"]);
    assert_eq!(argv_of(ECHO, "echo", &ExecutionContext::new()), ["echo"]);
}

#[rstest]
#[case::linux(OsFamily::Linux, "echo")]
#[case::windows(OsFamily::Windows, "cmd")]
#[case::solaris_falls_back(OsFamily::Solaris, "/usr/bin/echo")]
fn selects_command_per_os(#[case] os: OsFamily, #[case] program: &str) {
    let text = r#"
[[process]]
name = "echo"
command = { linux = "echo", windows = "cmd /c echo", default = "/usr/bin/echo" }
"#;
    let registry = TemplateRegistry::from_toml_str_for(
        text,
        os,
        &ActionKinds::default(),
        &ResolverRegistry::default(),
    )
    .expect("load");
    let template = registry.get("echo").expect("template");
    assert_eq!(template.command()[0], program);
}

#[rstest]
#[case("linux", OsFamily::Linux)]
#[case("macos", OsFamily::Linux)]
#[case("illumos", OsFamily::Solaris)]
#[case("solaris", OsFamily::Solaris)]
#[case("windows", OsFamily::Windows)]
fn maps_os_names(#[case] name: &str, #[case] family: OsFamily) {
    assert_eq!(OsFamily::from_os_name(name), family);
}

#[test]
fn missing_command_for_os_fails_the_load() {
    let text = r#"
[[process]]
name = "dir"
command = { windows = "cmd /c dir" }
"#;
    assert!(matches!(
        load(text),
        Err(TemplateError::MissingCommand {
            os: OsFamily::Linux,
            ..
        })
    ));
}

#[test]
fn emits_names_separators_and_flags() {
    let text = r#"
[[process]]
name = "tool"
command = { default = "tool" }

[[process.parameter]]
name = "--level"
value = "${LEVEL}"
separator = "="

[[process.parameter]]
name = "-o"
value = "${OUT}"

[[process.parameter]]
name = "--verbose"

[[process.parameter]]
name = "--raw"
value = "${LEVEL}"
resolver = "literal"
"#;
    let context = ExecutionContext::new().with("LEVEL", "3").with("OUT", "out file");
    assert_eq!(
        argv_of(text, "tool", &context),
        ["tool", "--level=3", "-o", "out file", "--verbose", "--raw", "${LEVEL}"]
    );
}

const GROUPED: &str = r#"
[[process]]
name = "ssh"
command = { default = "ssh host" }

[[process.parameter]]
value = "run"
begin_group = true

[[process.parameter]]
name = "--user"
value = "${USER}"
if_defined = "USER"

[[process.parameter]]
value = "${TASK}"
if_defined = "TASK"
end_group = true

[[process.parameter]]
value = "${TAIL}"
if_defined = "TAIL"
begin_group = true
"#;

#[test]
fn joins_group_members_into_one_argument() {
    let context = ExecutionContext::new()
        .with("USER", "ops")
        .with("TASK", "deploy")
        .with("TAIL", "x");
    assert_eq!(
        argv_of(GROUPED, "ssh", &context),
        ["ssh", "host", "run --user ops deploy", "x"]
    );
}

#[test]
fn skipped_members_drop_out_of_groups() {
    let context = ExecutionContext::new().with("TASK", "deploy");
    assert_eq!(argv_of(GROUPED, "ssh", &context), ["ssh", "host", "run deploy"]);
}

#[test]
fn fully_skipped_groups_emit_nothing() {
    let text = r#"
[[process]]
name = "g"
command = { default = "prog" }

[[process.parameter]]
value = "${A}"
if_defined = "A"
begin_group = true

[[process.parameter]]
value = "${B}"
if_defined = "B"
end_group = true

[[process.parameter]]
value = "last"
"#;
    assert_eq!(argv_of(text, "g", &ExecutionContext::new()), ["prog", "last"]);
}

#[test]
fn nested_begin_markers_do_not_open_new_groups() {
    let text = r#"
[[process]]
name = "g"
command = { default = "prog" }

[[process.parameter]]
value = "a"
begin_group = true

[[process.parameter]]
value = "b"
begin_group = true

[[process.parameter]]
value = "c"
end_group = true

[[process.parameter]]
value = "d"
end_group = true
"#;
    assert_eq!(argv_of(text, "g", &ExecutionContext::new()), ["prog", "a b c", "d"]);
}

#[test]
fn quoted_command_tokens_survive_substitution() {
    let text = r#"
[[process]]
name = "sh"
command = { default = "sh -c 'printf %s \"$0\"' ${WHO}" }
"#;
    let context = ExecutionContext::new().with("WHO", "two words");
    assert_eq!(
        argv_of(text, "sh", &context),
        ["sh", "-c", "printf %s \"$0\"", "two words"]
    );
}

#[rstest]
fn undefined_variables_fail_resolution(resolvers: ResolverRegistry) {
    let text = r#"
[[process]]
name = "echo"
command = { default = "echo ${MISSING}" }
"#;
    let registry = load(text).expect("load");
    let error = registry
        .get("echo")
        .expect("template")
        .argv(&ExecutionContext::new(), &resolvers)
        .expect_err("undefined");
    assert!(matches!(
        error,
        TemplateError::Resolve {
            source: ResolveError::UndefinedVariable { .. },
            ..
        }
    ));
}

#[rstest]
fn launch_carries_environment_and_directory(resolvers: ResolverRegistry) {
    let text = r#"
[[process]]
name = "build"
command = { default = "make" }
directory = "${ROOT}/src"

[process.environment]
CC = "gcc"
TARGET = { value = "ARCH", resolver = "context" }
"#;
    let context = ExecutionContext::new().with("ROOT", "/work").with("ARCH", "x86_64");
    let registry = load(text).expect("load");
    let launch = registry
        .get("build")
        .expect("template")
        .launch(&context, &resolvers)
        .expect("launch");

    assert_eq!(launch.program(), "make");
    assert_eq!(
        launch.directory().map(|dir| dir.to_string_lossy().into_owned()),
        Some(String::from("/work/src"))
    );
    let environment = launch.environment().expect("environment");
    assert_eq!(environment.get("CC").map(String::as_str), Some("gcc"));
    assert_eq!(environment.get("TARGET").map(String::as_str), Some("x86_64"));
}

#[rstest]
#[case::duplicate(
    "[[process]]\nname = \"a\"\ncommand = { default = \"x\" }\n[[process]]\nname = \"a\"\ncommand = { default = \"y\" }\n"
)]
#[case::empty_name("[[process]]\nname = \" \"\ncommand = { default = \"x\" }\n")]
#[case::unknown_kind("[[process]]\nname = \"a\"\nkind = \"java_class\"\ncommand = { default = \"x\" }\n")]
#[case::unknown_resolver(
    "[[process]]\nname = \"a\"\ncommand = { default = \"x\" }\n[[process.parameter]]\nvalue = \"v\"\nresolver = \"groovy\"\n"
)]
#[case::unbalanced_quotes("[[process]]\nname = \"a\"\ncommand = { default = \"echo 'oops\" }\n")]
#[case::blank_command("[[process]]\nname = \"a\"\ncommand = { default = \"  \" }\n")]
#[case::unknown_field("[[process]]\nname = \"a\"\nshell = true\ncommand = { default = \"x\" }\n")]
fn invalid_documents_fail_the_load(
    kinds: ActionKinds,
    resolvers: ResolverRegistry,
    #[case] text: &str,
) {
    let result = TemplateRegistry::from_toml_str_for(text, OsFamily::Linux, &kinds, &resolvers);
    assert!(result.is_err(), "expected failure for {text:?}");
}

#[rstest]
fn lists_names_and_kinds(kinds: ActionKinds, resolvers: ResolverRegistry) {
    let text = r#"
[[process]]
name = "b"
command = { default = "true" }

[[process]]
name = "a"
kind = "os_command"
command = { default = "true" }

[[process.parameter]]
value = "ARG"
resolver = "context"
"#;
    let registry =
        TemplateRegistry::from_toml_str_for(text, OsFamily::Linux, &kinds, &resolvers)
            .expect("load");
    assert_eq!(registry.names(), ["a", "b"]);
    let template = registry.get("a").expect("a");
    assert_eq!(template.kind(), OS_COMMAND_KIND);
    assert_eq!(template.parameters()[0].value().resolver(), CONTEXT_RESOLVER);
    assert_ne!(template.parameters()[0].value().resolver(), LITERAL_RESOLVER);
}

#[test]
fn empty_documents_load_no_templates() {
    let registry = load("").expect("empty document");
    assert!(registry.is_empty());
}
