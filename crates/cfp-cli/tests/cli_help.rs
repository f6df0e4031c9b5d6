use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("cfp")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("notifications"))
        .stdout(predicate::str::contains("proposals"))
        .stdout(predicate::str::contains("tags"));
}

#[test]
fn test_proposals_help_shows_subcommands() {
    cargo_bin_cmd!("cfp")
        .args(["proposals", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("review"));
}

#[test]
fn test_notifications_help_shows_watch() {
    cargo_bin_cmd!("cfp")
        .args(["notifications", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("read-all"));
}

#[test]
fn test_review_rating_out_of_range_is_rejected() {
    cargo_bin_cmd!("cfp")
        .args(["proposals", "review", "1", "--rating", "6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rating"));
}

#[test]
fn test_unknown_status_is_rejected() {
    cargo_bin_cmd!("cfp")
        .args(["proposals", "status", "1", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown proposal status"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("cfp")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}
