use anyhow::Result;
use bx_domain::{load_lockfile, Lockfile, PackageError};

use super::*;
use crate::core::testing::{TestProject, PLATFORM};

fn declared(packages: &[&str]) -> Vec<String> {
    packages.iter().map(|p| (*p).to_string()).collect()
}

fn run(
    project: &TestProject,
    session: &ProfileSession,
    mode: InstallMode,
    packages: &[&str],
    lockfile: &mut Lockfile,
) -> Result<ReconcileReport> {
    Reconciler::from_parts(project.effects.as_ref(), &project.paths, PLATFORM, false, session)
        .run(mode, &declared(packages), lockfile)
}

fn calls_starting_with(project: &TestProject, prefix: &str) -> Vec<String> {
    project
        .store
        .calls()
        .into_iter()
        .filter(|call| call.starts_with(prefix))
        .collect()
}

#[test]
fn second_run_is_served_from_the_state_cache() -> Result<()> {
    let project = TestProject::new(&["hello", "jq"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let first = run(&project, &session, InstallMode::Ensure, &["hello", "jq"], &mut lockfile)?;
    assert_eq!(first.installed, vec!["hello", "jq"]);
    assert!(!first.up_to_date);

    project.store.clear_calls();
    let mut reloaded = load_lockfile(&project.paths.lockfile)?;
    let second = run(&project, &session, InstallMode::Ensure, &["hello", "jq"], &mut reloaded)?;
    assert!(second.up_to_date);
    assert!(!second.changed());
    assert!(project.store.calls().is_empty());
    Ok(())
}

#[test]
fn ensure_converges_profile_onto_declared_set() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.store.seed_installed("ripgrep");
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert_eq!(report.installed, vec!["hello"]);
    assert_eq!(report.removed, vec!["ripgrep"]);
    assert_eq!(project.store.installed(), vec!["hello"]);

    let reconciler =
        Reconciler::from_parts(project.effects.as_ref(), &project.paths, PLATFORM, false, &session);
    let plan = reconciler.plan(&declared(&["hello"]), &lockfile)?;
    assert!(plan.pending.is_empty());
    assert!(plan.extras.is_empty());
    Ok(())
}

#[test]
fn installs_follow_declaration_order() -> Result<()> {
    let project = TestProject::new(&[])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    run(&project, &session, InstallMode::Install, &["jq", "hello", "ripgrep"], &mut lockfile)?;
    let installs = calls_starting_with(&project, "install ");
    assert_eq!(installs.len(), 3);
    assert!(installs[0].ends_with("#jq"));
    assert!(installs[1].ends_with("#hello"));
    assert!(installs[2].ends_with("#ripgrep"));
    assert_eq!(project.store.installed(), vec!["jq", "hello", "ripgrep"]);
    Ok(())
}

#[test]
fn failed_install_keeps_earlier_packages_and_persists_nothing() -> Result<()> {
    let project = TestProject::new(&[])?;
    project.store.fail_install_of("jq");
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let err = run(
        &project,
        &session,
        InstallMode::Ensure,
        &["hello", "jq", "ripgrep"],
        &mut lockfile,
    )
    .expect_err("install of jq fails");
    match err.downcast_ref::<PackageError>() {
        Some(PackageError::ExternalProcess { message, .. }) => {
            assert_eq!(message, "error: build of 'jq' failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(project.store.installed(), vec!["hello"]);
    assert!(!project.paths.lockfile.exists());
    assert!(!project.paths.state_file.exists());
    assert!(project.plugins.events().is_empty());

    project.store.clear_install_failures();
    project.store.clear_calls();
    let report = run(
        &project,
        &session,
        InstallMode::Ensure,
        &["hello", "jq", "ripgrep"],
        &mut lockfile,
    )?;
    assert_eq!(report.installed, vec!["jq", "ripgrep"]);
    let installs = calls_starting_with(&project, "install ");
    assert_eq!(installs.len(), 2);
    assert!(installs[0].ends_with("#jq"));
    assert!(installs[1].ends_with("#ripgrep"));
    assert_eq!(project.store.installed(), vec!["hello", "jq", "ripgrep"]);
    assert!(project.paths.state_file.exists());
    Ok(())
}

#[test]
fn extras_are_removed_highest_index_first() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    for name in ["ripgrep", "hello", "jq", "redis"] {
        project.store.seed_installed(name);
    }
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert_eq!(
        calls_starting_with(&project, "remove "),
        vec!["remove 3", "remove 2", "remove 0"]
    );
    assert_eq!(report.removed, vec!["redis", "jq", "ripgrep"]);
    assert!(report.installed.is_empty());
    assert_eq!(project.store.installed(), vec!["hello"]);
    Ok(())
}

#[test]
fn lock_entries_for_undeclared_packages_are_pruned() -> Result<()> {
    let project = TestProject::new(&["hello", "jq"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();
    run(&project, &session, InstallMode::Ensure, &["hello", "jq"], &mut lockfile)?;

    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert_eq!(report.lock_pruned, vec!["jq"]);
    let saved = load_lockfile(&project.paths.lockfile)?;
    assert_eq!(saved.packages.keys().collect::<Vec<_>>(), vec!["hello"]);
    assert!(saved.is_up_to_date(&declared(&["hello"])));
    Ok(())
}

#[test]
fn pinned_packages_are_not_resolved_again() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();
    run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert_eq!(calls_starting_with(&project, "resolve ").len(), 1);

    std::fs::remove_file(&project.paths.state_file)?;
    project.store.clear_calls();
    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert!(!report.up_to_date);
    assert!(!report.changed());
    assert!(calls_starting_with(&project, "resolve ").is_empty());
    assert_eq!(project.plugins.events().len(), 1);
    Ok(())
}

#[test]
fn install_mode_never_removes() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.store.seed_installed("ripgrep");
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let report = run(&project, &session, InstallMode::Install, &["hello"], &mut lockfile)?;
    assert_eq!(report.installed, vec!["hello"]);
    assert!(report.removed.is_empty());
    assert_eq!(project.store.installed(), vec!["ripgrep", "hello"]);
    Ok(())
}

#[test]
fn install_mode_leaves_extras_for_the_next_ensure() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.store.seed_installed("ripgrep");
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    run(&project, &session, InstallMode::Install, &["hello"], &mut lockfile)?;
    assert!(!project.paths.state_file.exists());

    let mut reloaded = load_lockfile(&project.paths.lockfile)?;
    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut reloaded)?;
    assert!(!report.up_to_date);
    assert_eq!(report.removed, vec!["ripgrep"]);
    assert_eq!(project.store.installed(), vec!["hello"]);
    Ok(())
}

#[test]
fn uninstall_mode_leaves_pending_packages_for_the_next_ensure() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    run(&project, &session, InstallMode::Uninstall, &["hello"], &mut lockfile)?;
    assert!(!project.paths.state_file.exists());

    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert_eq!(report.installed, vec!["hello"]);
    Ok(())
}

#[test]
fn install_mode_records_the_cache_when_nothing_is_left_over() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    run(&project, &session, InstallMode::Install, &["hello"], &mut lockfile)?;
    assert!(project.paths.state_file.exists());

    project.store.clear_calls();
    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert!(report.up_to_date);
    assert!(project.store.calls().is_empty());
    Ok(())
}

#[test]
fn state_cache_is_per_platform() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();
    run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;

    let other = Reconciler::from_parts(
        project.effects.as_ref(),
        &project.paths,
        "aarch64-darwin",
        false,
        &session,
    );
    let report = other.run(InstallMode::Ensure, &declared(&["hello"]), &mut lockfile)?;
    assert!(!report.up_to_date);
    Ok(())
}

#[test]
fn uninstall_mode_never_installs() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.store.seed_installed("ripgrep");
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let report = run(&project, &session, InstallMode::Uninstall, &["hello"], &mut lockfile)?;
    assert!(report.installed.is_empty());
    assert_eq!(report.removed, vec!["ripgrep"]);
    assert!(calls_starting_with(&project, "install ").is_empty());
    assert!(calls_starting_with(&project, "prefetch ").is_empty());
    assert!(project.store.installed().is_empty());
    Ok(())
}

#[test]
fn empty_declaration_on_empty_profile_is_a_no_op() -> Result<()> {
    let project = TestProject::new(&[])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let report = run(&project, &session, InstallMode::Ensure, &[], &mut lockfile)?;
    assert!(!report.changed());
    assert!(project.store.installed().is_empty());
    assert!(project.plugins.events().is_empty());
    assert!(project.paths.state_file.exists());
    Ok(())
}

#[test]
fn prefetch_covers_packages_without_a_cached_store_path() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.store.fail_prefetch();
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let reconciler = Reconciler::from_parts(
        project.effects.as_ref(),
        &project.paths,
        "aarch64-darwin",
        true,
        &session,
    );
    let report = reconciler.run(InstallMode::Ensure, &declared(&["hello"]), &mut lockfile)?;
    assert_eq!(calls_starting_with(&project, "prefetch ").len(), 1);
    assert_eq!(report.prefetch_failures, vec!["hello"]);
    assert_eq!(report.installed, vec!["hello"]);
    Ok(())
}

#[test]
fn prefetch_skips_packages_with_a_store_path_for_this_platform() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let reconciler =
        Reconciler::from_parts(project.effects.as_ref(), &project.paths, PLATFORM, true, &session);
    let report = reconciler.run(InstallMode::Ensure, &declared(&["hello"]), &mut lockfile)?;
    assert!(calls_starting_with(&project, "prefetch ").is_empty());
    assert!(report.prefetched.is_empty());
    Ok(())
}

#[test]
fn plugin_failure_fails_the_run_and_leaves_cache_stale() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    project.plugins.fail_on_change();
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let err = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)
        .expect_err("plugin hook fails");
    assert!(err.to_string().contains("plugin hook failed"));
    assert_eq!(project.plugins.events(), vec!["changed hello"]);
    assert!(!project.paths.state_file.exists());
    Ok(())
}

#[test]
fn unresolvable_package_is_a_resolution_error() -> Result<()> {
    let project = TestProject::new(&["nonexistent"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();

    let err = run(&project, &session, InstallMode::Ensure, &["nonexistent"], &mut lockfile)
        .expect_err("nothing resolves nonexistent");
    assert!(matches!(
        err.downcast_ref::<PackageError>(),
        Some(PackageError::Resolution { reference, .. }) if reference == "nonexistent"
    ));
    assert!(calls_starting_with(&project, "install ").is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn legacy_profile_is_reset_once() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let nix_dir = project.paths.profile.parent().expect("profile has a parent");
    let generation = nix_dir.join("profile-7-link");
    std::fs::create_dir_all(&generation)?;
    std::fs::write(generation.join("manifest.nix"), "[]")?;
    std::os::unix::fs::symlink("profile-7-link", &project.paths.profile)?;

    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();
    run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;

    let target = std::fs::read_link(&project.paths.profile)?;
    assert_eq!(target, std::path::PathBuf::from("profile-1-link"));
    assert!(generation.join("manifest.nix").exists());
    assert!(!session.claim_legacy_reset_check());
    Ok(())
}

#[cfg(unix)]
#[test]
fn external_profile_change_invalidates_the_cache() -> Result<()> {
    let project = TestProject::new(&["hello"])?;
    let session = ProfileSession::new();
    let mut lockfile = Lockfile::default();
    run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;

    project.store.seed_installed("jq");
    std::fs::remove_file(&project.paths.profile)?;
    std::os::unix::fs::symlink("profile-99-link", &project.paths.profile)?;

    let report = run(&project, &session, InstallMode::Ensure, &["hello"], &mut lockfile)?;
    assert!(!report.up_to_date);
    assert_eq!(report.removed, vec!["jq"]);
    Ok(())
}
