use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};
use tempfile::TempDir;

fn script(name: &str) -> PathBuf {
    Path::new("tests/scripts").join(name)
}

/// The hbcxx binary, isolated from the user's rc file and cache.
fn hbcxx(cache: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_hbcxx"));
    command
        .env("HBCXX_CACHE_DIR", cache.path())
        .env("HBCXXRC", cache.path().join("no-rc-file"))
        .env_remove("CXX")
        .stdin(Stdio::null());
    command
}

fn run(command: &mut Command) -> Result<Output> {
    command.output().context("failed to execute hbcxx")
}

fn have_compiler() -> bool {
    ["g++", "clang++", "c++"].iter().any(|cxx| {
        Command::new(cxx)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

macro_rules! require_compiler {
    () => {
        if !have_compiler() {
            eprintln!("skipping: no C++ compiler installed");
            return Ok(());
        }
    };
}

#[test]
fn interpreter_line_only_script_runs() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("hello.cpp")))?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello from tests/scripts/hello.cpp"), "{stdout}");
    Ok(())
}

#[test]
fn program_arguments_and_exit_status_pass_through() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("hello.cpp")).args(["one", "--two"]))?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn flag_directives_reach_the_compiler() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg("--hbcxx-O1").arg(script("flags.cpp")))?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    Ok(())
}

#[test]
fn included_header_pulls_in_its_source() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("multi/main.cpp")))?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    Ok(())
}

#[test]
fn child_signal_is_re_raised() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("quit.cpp")))?;
    assert_eq!(output.status.signal(), Some(libc::SIGQUIT));
    assert!(!output.status.core_dumped());
    Ok(())
}

#[test]
fn executable_option_builds_without_running() -> Result<()> {
    require_compiler!();
    let cache = TempDir::new()?;
    let exe = cache.path().join("hello");

    let output = run(hbcxx(&cache)
        .arg(format!("--hbcxx-executable={}", exe.display()))
        .arg(script("hello.cpp")))?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty());

    let status = Command::new(&exe).arg("x").status()?;
    assert_eq!(status.code(), Some(1));
    Ok(())
}

#[test]
fn missing_package_fails_before_compiling() -> Result<()> {
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("missing_package.cpp")))?;
    assert_eq!(output.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing_package.cpp:2:1: error"), "{stderr}");
    assert!(stderr.contains("nonexistent-package"), "{stderr}");
    Ok(())
}

#[test]
fn unknown_directive_is_reported_with_location() -> Result<()> {
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg(script("unknown_directive.cpp")))?;
    assert_eq!(output.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown_directive.cpp:2:1: error: unknown directive: frobnicate"),
        "{stderr}"
    );
    assert!(!stderr.contains("not a directive"), "{stderr}");
    Ok(())
}

#[test]
fn no_input_file() -> Result<()> {
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg("-Wall"))?;
    assert_eq!(output.status.code(), Some(125));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot find file to execute"), "{stderr}");

    let output = run(hbcxx(&cache).arg("--help"))?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("USAGE: hbcxx"));
    Ok(())
}

#[test]
fn version_and_help_options() -> Result<()> {
    let cache = TempDir::new()?;

    let output = run(hbcxx(&cache).arg("--hbcxx-version"))?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("hbcxx "));

    let output = run(hbcxx(&cache).arg("--hbcxx-help"))?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--hbcxx-save-temps"));
    Ok(())
}
