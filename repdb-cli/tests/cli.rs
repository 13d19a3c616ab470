use assert_cmd::Command;
use predicates::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn repdbcli() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("repdbcli")?)
}

#[test]
fn banner_marks_every_tick() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("dump()\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Time Tick: 0"))
        .stdout(predicate::str::contains("Time Tick: 1"));
    Ok(())
}

#[test]
fn dump_prints_seed_values_per_site() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("dump()\n");
    cmd.assert()
        .success()
        // site 1 hosts only the replicated (even) items
        .stdout(predicate::str::contains("site 1 - x2: 20, x4: 40"))
        // site 2 additionally hosts x1 and x11
        .stdout(predicate::str::contains("site 2 - x1: 10, x2: 20"))
        .stdout(predicate::str::contains("x20: 200"));
    Ok(())
}

#[test]
fn read_only_transactions_see_their_snapshot() -> TestResult {
    let script = "\
begin(T1)
W(T1, x1, 101)
end(T1)
beginRO(T2)
begin(T3)
W(T3, x1, 202)
end(T3)
R(T2, x1)
end(T2)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert()
        .success()
        // T2 snapshots x1 as of its begin: T1's 101, not T3's 202
        .stdout(predicate::str::contains(
            "Received from Site 2 READ operation result on Transaction T2 | OPid: 2 | Key = 1 | Value = 101",
        ))
        .stdout(predicate::str::contains("Transaction T2 finished successfully!"));
    Ok(())
}

#[test]
fn write_write_deadlock_kills_the_youngest() -> TestResult {
    let script = "\
begin(T1)
begin(T2)
W(T1, x1, 11)
W(T2, x2, 22)
W(T1, x2, 33)
W(T2, x1, 44)
end(T1)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Transaction T2 aborted because of deadlock"))
        .stdout(predicate::str::contains("Transaction T1 finished successfully!"));
    Ok(())
}

#[test]
fn replicated_reads_survive_a_failed_site() -> TestResult {
    let script = "\
fail(2)
begin(T1)
R(T1, x2)
end(T1)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Received from Site 1 READ operation result on Transaction T1 | OPid: 0 | Key = 2 | Value = 20",
        ))
        .stdout(predicate::str::contains("Transaction T1 finished successfully!"));
    Ok(())
}

#[test]
fn site_failure_aborts_transactions_that_visited_it() -> TestResult {
    let script = "\
begin(T1)
W(T1, x4, 99)
fail(3)
end(T1)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Transaction T1 aborted, because it has accessed Site 3 and this site failed",
        ))
        .stdout(predicate::str::contains("Transaction T1 has already aborted"));
    Ok(())
}

#[test]
fn recovered_replica_defers_to_a_fresh_one() -> TestResult {
    let script = "\
fail(2)
recover(2)
begin(T1)
R(T1, x4)
end(T1)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert().success().stdout(predicate::str::contains(
        "Received from Site 1 READ operation result on Transaction T1 | OPid: 0 | Key = 4 | Value = 40",
    ));
    Ok(())
}

#[test]
fn lock_upgrade_then_commit_lands_on_the_home_site() -> TestResult {
    let script = "\
begin(T1)
R(T1, x3)
W(T1, x3, 77)
end(T1)
dump(x3)
";
    let mut cmd = repdbcli()?;
    cmd.write_stdin(script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Transaction T1 finished successfully!"))
        .stdout(predicate::str::contains("site 4 - x3: 77"));
    Ok(())
}

#[test]
fn one_line_carries_many_commands() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("begin(T1); W(T1, x2, 5); end(T1) // all in one tick\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Received from Site 10 WRITE operation result on Transaction T1 | OPid: 0 | Key = 2 | Value = 5",
        ))
        .stdout(predicate::str::contains("Transaction T1 finished successfully!"));
    Ok(())
}

#[test]
fn query_flag_runs_a_script() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.arg("--query=begin(T1); end(T1)");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Transaction T1 finished successfully!"));
    Ok(())
}

#[test]
fn unknown_commands_exit_nonzero() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("frobnicate(T1)\n");
    cmd.assert().failure().stderr(predicate::str::contains("unknown command"));
    Ok(())
}

#[test]
fn ops_of_unknown_transactions_exit_nonzero() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("R(T9, x2)\n");
    cmd.assert().failure().stderr(predicate::str::contains("unknown transaction"));
    Ok(())
}

#[test]
fn out_of_range_sites_exit_nonzero() -> TestResult {
    let mut cmd = repdbcli()?;
    cmd.write_stdin("fail(11)\n");
    cmd.assert().failure();
    Ok(())
}
