//! Tests for the brew coordinator protocol

use super::coordinator::WorkflowCoordinator;
use super::disruption::ManualDisruption;
use super::state::WorkflowState;
use crate::config::BrewConfig;
use crate::error::Error;
use crate::kitchen::{HeatingState, ResourceKind};
use crate::sync::{CancelCause, CancelScope};
use crate::testing::fast_config;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_cup_is_drained_reset_and_retried() {
    let config = fast_config(30);
    let coordinator = WorkflowCoordinator::new(&config);
    let kitchen = coordinator.kitchen().clone();

    let report = coordinator.run().await.unwrap();

    assert_eq!(report.assembly_attempts, 2);
    assert_eq!(
        report.history,
        vec![
            WorkflowState::Init,
            WorkflowState::DurablesAndHeatingInFlight,
            WorkflowState::AssemblyGroupActive,
            WorkflowState::AssemblyCancelledDraining,
            WorkflowState::AssemblyGroupRetrying,
            WorkflowState::AssemblyComplete,
            WorkflowState::Finishing,
            WorkflowState::Done,
        ]
    );

    let after_reset = report.after_reset.expect("bench was reset");
    assert!(after_reset.bench.is_clear());
    assert!(after_reset.durables.all_ready());
    assert!(report.after_durables.durables.all_ready());

    let done = report.final_state;
    assert!(done.bench.is_assembled());
    assert!(done.bench.hot_water);
    assert!(done.bench.milk_poured);
    assert_eq!(done.bench.stirs, 2);
    assert!(done.durables.all_ready());
    assert_eq!(done.kettle, HeatingState::Boiled);

    // The retry reused the durable supplies
    for kind in ResourceKind::ALL {
        assert_eq!(kitchen.durables.acquisitions(kind), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_undisturbed_run_assembles_once() {
    let config = fast_config(20);
    let report = WorkflowCoordinator::new(&config)
        .without_disruption()
        .run()
        .await
        .unwrap();

    assert_eq!(report.assembly_attempts, 1);
    assert!(report.after_reset.is_none());
    assert!(!report
        .history
        .contains(&WorkflowState::AssemblyCancelledDraining));
    assert!(report.final_state.bench.is_assembled());
    assert_eq!(report.final_state.bench.stirs, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_matches_undisturbed_assembly() {
    let config = fast_config(20);
    let retried = WorkflowCoordinator::new(&config).run().await.unwrap();
    let clean = WorkflowCoordinator::new(&config)
        .without_disruption()
        .run()
        .await
        .unwrap();

    assert_eq!(retried.final_state, clean.final_state);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drop_before_prerequisites_ready() {
    let config = fast_config(30);
    let disruption = ManualDisruption::new();
    disruption.fire();

    let report = WorkflowCoordinator::new(&config)
        .with_disruption(disruption)
        .run()
        .await
        .unwrap();

    assert_eq!(report.assembly_attempts, 2);
    assert!(report.after_reset.unwrap().bench.is_clear());
    assert!(report.final_state.bench.is_assembled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_heating_finishing_after_assembly_is_awaited() {
    let config = BrewConfig {
        boil_steps: 12,
        ..fast_config(20)
    };
    let report = WorkflowCoordinator::new(&config).run().await.unwrap();
    assert_eq!(report.final_state.kettle, HeatingState::Boiled);
    assert!(report.final_state.bench.hot_water);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_master_cancellation_faults_the_run() {
    let config = fast_config(40);
    let process = CancelScope::root("process");
    let coordinator = WorkflowCoordinator::new(&config)
        .without_disruption()
        .within(&process);

    // Durables finish at 40ms; the cup is still being prepared at 60ms
    process.cancel_after(Duration::from_millis(60), "interrupted");
    let fault = coordinator.run().await.unwrap_err();

    assert_eq!(fault.state, WorkflowState::AssemblyGroupActive);
    assert!(fault.error.is_cancelled());
    assert_ne!(fault.snapshot.kettle, HeatingState::Boiled);
    assert!(fault.snapshot.durables.all_ready());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_during_armed_attempt_is_not_treated_as_a_drop() {
    let config = fast_config(40);
    let process = CancelScope::root("process");
    let coordinator = WorkflowCoordinator::new(&config).within(&process);

    // The cup would be dropped at 160ms; the interrupt lands first
    process.cancel_after(Duration::from_millis(60), "interrupted");
    let fault = coordinator.run().await.unwrap_err();

    assert_eq!(fault.state, WorkflowState::AssemblyGroupActive);
    assert_eq!(
        fault.error,
        Error::Cancelled(CancelCause {
            scope: "process".to_string(),
            reason: "interrupted".to_string(),
        })
    );
    assert!(!fault.snapshot.bench.tea_bag && !fault.snapshot.bench.sugar);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_milk_faults_before_assembly() {
    let config = BrewConfig {
        unavailable: vec![ResourceKind::Milk],
        ..fast_config(20)
    };
    let coordinator = WorkflowCoordinator::new(&config);
    let master = coordinator.master_scope();

    let fault = coordinator.run().await.unwrap_err();

    assert_eq!(fault.state, WorkflowState::DurablesAndHeatingInFlight);
    assert!(matches!(fault.error, Error::Acquisition { .. }));
    assert!(fault.to_string().contains("durables-and-heating-in-flight"));
    assert!(master.is_cancelled());
}
