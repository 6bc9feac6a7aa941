use konverge_api::{AppliedRecord, DeployedStatus, ReleaseStatus};

/*
 * What to do with a desired Release service, given what the ledger says
 * and what the deployer reports.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseDecision {
    /* live status is Unknown, nothing can be decided safely */
    Abort,

    Install,

    Upgrade,

    /* revision and content hashes match, already converged */
    Unchanged,

    /* the live release moved away from what we recorded */
    Drifted { recorded: String, live: String },

    /* unexpected live status: uninstall, then fail the service */
    Remediate(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrphanDecision {
    Abort,

    /* nothing deployed, only the ledger entry has to go */
    Forget,

    Uninstall,

    /* revision changed out-of-band, leave both release and record alone */
    Keep { recorded: String, live: String },

    /* unexpected live status, try to uninstall but forget it anyway */
    BestEffortUninstall(String),
}

fn recorded_revision(record: Option<&AppliedRecord>) -> String {
    record.and_then(|rec| rec.revision.clone()).unwrap_or_default()
}

/*
 * A Deployed release is only touched when the live revision is the one we
 * recorded; then chart and override hashes decide between upgrade and
 * no-op. Revisions are compared as text.
 */
pub fn decide_release(record: Option<&AppliedRecord>, live: &ReleaseStatus, chart_hash: Option<&str>, override_hash: Option<&str>) -> ReleaseDecision {
    match &live.status {
	DeployedStatus::Unknown => ReleaseDecision::Abort,
	DeployedStatus::NotDeployed => ReleaseDecision::Install,
	DeployedStatus::Deployed => {
	    let recorded = recorded_revision(record);
	    let live = live.revision_label();
	    if recorded != live {
		return ReleaseDecision::Drifted{ recorded: recorded, live: live };
	    }

	    let recorded_chart = record.and_then(|rec| rec.chart_hash());
	    let recorded_override = record.and_then(|rec| rec.override_hash());
	    if recorded_chart == chart_hash && recorded_override == override_hash {
		ReleaseDecision::Unchanged
	    } else {
		ReleaseDecision::Upgrade
	    }
	},
	other => ReleaseDecision::Remediate(other.label().to_string()),
    }
}

pub fn decide_orphan(record: &AppliedRecord, live: &ReleaseStatus) -> OrphanDecision {
    match &live.status {
	DeployedStatus::Unknown => OrphanDecision::Abort,
	DeployedStatus::NotDeployed => OrphanDecision::Forget,
	DeployedStatus::Deployed => {
	    let recorded = recorded_revision(Some(record));
	    let live = live.revision_label();
	    if recorded == live {
		OrphanDecision::Uninstall
	    } else {
		OrphanDecision::Keep{ recorded: recorded, live: live }
	    }
	},
	other => OrphanDecision::BestEffortUninstall(other.label().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konverge_api::{ServiceKind, ServiceSpec};

    fn record(revision: i64, chart: &str, values: &str) -> AppliedRecord {
	let mut spec = ServiceSpec::new("svc", ServiceKind::Release);
	spec.chart_hash = Some(chart.to_string());
	AppliedRecord::released(spec, revision, Some(values.to_string()))
    }

    #[test]
    fn converged_release_is_left_alone() {
	let rec = record(1, "H1", "O1");
	let live = ReleaseStatus::new("Deployed", 1);

	assert_eq!(decide_release(Some(&rec), &live, Some("H1"), Some("O1")), ReleaseDecision::Unchanged);
    }

    #[test]
    fn any_hash_change_upgrades() {
	let rec = record(1, "H1", "O1");
	let live = ReleaseStatus::new("Deployed", 1);

	assert_eq!(decide_release(Some(&rec), &live, Some("H2"), Some("O1")), ReleaseDecision::Upgrade);
	assert_eq!(decide_release(Some(&rec), &live, Some("H1"), Some("O2")), ReleaseDecision::Upgrade);
	assert_eq!(decide_release(Some(&rec), &live, Some("H1"), None), ReleaseDecision::Upgrade);
    }

    #[test]
    fn revision_drift_wins_over_hashes() {
	let rec = record(1, "H1", "O1");
	let live = ReleaseStatus::new("Deployed", 5);

	let expected = ReleaseDecision::Drifted{ recorded: String::from("1"), live: String::from("5") };
	assert_eq!(decide_release(Some(&rec), &live, Some("H2"), Some("O1")), expected);
    }

    #[test]
    fn deployed_without_record_is_drift() {
	let live = ReleaseStatus::new("Deployed", 2);

	let expected = ReleaseDecision::Drifted{ recorded: String::new(), live: String::from("2") };
	assert_eq!(decide_release(None, &live, None, None), expected);
    }

    #[test]
    fn status_table_for_desired_releases() {
	let rec = record(1, "H1", "O1");

	assert_eq!(decide_release(Some(&rec), &ReleaseStatus::new("Unknown", 1), None, None), ReleaseDecision::Abort);
	assert_eq!(decide_release(None, &ReleaseStatus::new("Not Deployed", 0), None, None), ReleaseDecision::Install);
	assert_eq!(decide_release(None, &ReleaseStatus::new("Pending", 1), None, None), ReleaseDecision::Remediate(String::from("Pending")));
	assert_eq!(decide_release(None, &ReleaseStatus::new("failed", 1), None, None), ReleaseDecision::Remediate(String::from("failed")));
    }

    #[test]
    fn status_table_for_orphans() {
	let rec = record(3, "H1", "O1");

	assert_eq!(decide_orphan(&rec, &ReleaseStatus::new("Unknown", 3)), OrphanDecision::Abort);
	assert_eq!(decide_orphan(&rec, &ReleaseStatus::new("Not Deployed", 0)), OrphanDecision::Forget);
	assert_eq!(decide_orphan(&rec, &ReleaseStatus::new("Deployed", 3)), OrphanDecision::Uninstall);
	assert_eq!(decide_orphan(&rec, &ReleaseStatus::new("Deployed", 4)),
		   OrphanDecision::Keep{ recorded: String::from("3"), live: String::from("4") });
	assert_eq!(decide_orphan(&rec, &ReleaseStatus::new("Pending", 3)), OrphanDecision::BestEffortUninstall(String::from("Pending")));
    }
}
