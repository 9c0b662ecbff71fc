//! Unit tests for the decision engine

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use availability_operator::crd::{
    AvailabilityClass, DisruptionOverrides, EnforcementMode, MaintenanceWindow, Recurrence,
};
use availability_operator::policy::annotations::{
    AVAILABILITY_CLASS, MAINTENANCE_WINDOW, MANAGED, MAX_UNAVAILABLE, MIN_AVAILABLE,
};
use availability_operator::policy::{
    DecisionEngine, DecisionSource, Diagnostic, DisruptionParameter, DisruptionValue,
    MaintenanceGate, Outcome, Protection, SkipReason, WorkloadSnapshot,
};

use crate::common::*;

fn engine() -> DecisionEngine {
    DecisionEngine::new(EnforcementMode::Strict)
}

fn frontend(replicas: i32, annotations: &[(&str, &str)]) -> WorkloadSnapshot {
    snapshot("ns1", "api", replicas, &[("tier", "frontend")], annotations)
}

fn p1() -> PolicyBuilder {
    PolicyBuilder::new("ns1", "p1").select("tier", "frontend")
}

fn protection(outcome: &Outcome) -> &Protection {
    match outcome {
        Outcome::Protect(p) => p,
        Outcome::NoPdb { reason } => panic!("expected protection, got no PDB ({})", reason),
    }
}

fn min_percent(p: u8) -> DisruptionParameter {
    DisruptionParameter::MinAvailable(DisruptionValue::Percent(p))
}

mod scenarios {
    use super::*;

    #[test]
    fn test_high_availability_strict_policy() {
        let policies = vec![p1().build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());

        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::HighAvailability);
        assert_eq!(p.parameter, min_percent(75));
        assert_eq!(p.mode, EnforcementMode::Strict);
        assert!(!p.relaxed);
        assert_eq!(
            p.sources,
            vec![
                DecisionSource::Policy {
                    namespace: "ns1".to_string(),
                    name: "p1".to_string()
                },
                DecisionSource::ClassDefault {
                    class: AvailabilityClass::HighAvailability
                },
            ]
        );
        assert!(decision.diagnostics.is_empty());
        assert!(!decision.has_windows);
    }

    #[test]
    fn test_strict_mode_rejects_class_annotation() {
        let policies = vec![p1().build()];
        let workload = frontend(5, &[(AVAILABILITY_CLASS, "non-critical")]);
        let decision = engine().decide(&workload, &policies, test_start());

        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::HighAvailability);
        assert_eq!(p.parameter, min_percent(75));
        assert_eq!(
            decision.diagnostics,
            vec![Diagnostic::OverrideRejected {
                annotation: "availability-class".to_string(),
                mode: EnforcementMode::Strict,
                reason: "policy takes precedence".to_string(),
            }]
        );
    }

    #[test]
    fn test_advisory_mode_takes_annotation_class() {
        let policies = vec![p1().mode(EnforcementMode::Advisory).build()];
        let workload = frontend(5, &[(AVAILABILITY_CLASS, "non-critical")]);
        let decision = engine().decide(&workload, &policies, test_start());

        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::NonCritical);
        assert_eq!(p.parameter, min_percent(0));
        assert_eq!(p.mode, EnforcementMode::Advisory);
        // The governing policy is still credited
        assert!(matches!(p.sources[0], DecisionSource::Policy { .. }));
        assert!(p.sources.contains(&DecisionSource::Annotation {
            key: "availability-class".to_string()
        }));
        assert!(decision.diagnostics.is_empty());
    }
}

mod eligibility {
    use super::*;

    #[test]
    fn test_zero_replicas_never_get_a_pdb() {
        for class in [
            AvailabilityClass::NonCritical,
            AvailabilityClass::MissionCritical,
        ] {
            let policies = vec![p1().class(class).build()];
            let decision = engine().decide(&frontend(0, &[]), &policies, test_start());
            assert_eq!(
                decision.outcome,
                Outcome::NoPdb {
                    reason: SkipReason::ZeroReplicas
                }
            );
        }
    }

    #[test]
    fn test_opted_out_workload() {
        let policies = vec![p1().build()];
        let decision = engine().decide(&frontend(5, &[(MANAGED, "false")]), &policies, test_start());
        assert_eq!(
            decision.outcome,
            Outcome::NoPdb {
                reason: SkipReason::OptedOut
            }
        );
    }

    #[test]
    fn test_no_policy_and_no_annotations() {
        let policies = vec![PolicyBuilder::new("ns1", "p1").select("tier", "backend").build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        assert_eq!(
            decision.outcome,
            Outcome::NoPdb {
                reason: SkipReason::NoMatchingPolicy
            }
        );
    }

    #[test]
    fn test_policies_of_other_namespaces_do_not_match() {
        let policies = vec![PolicyBuilder::new("ns2", "p1").select("tier", "frontend").build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        assert!(decision.protection().is_none());
    }

    #[test]
    fn test_deleting_policy_is_ignored() {
        let policies = vec![p1().deleting().build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        assert_eq!(
            decision.outcome,
            Outcome::NoPdb {
                reason: SkipReason::NoMatchingPolicy
            }
        );
    }

    #[test]
    fn test_annotations_alone_request_protection() {
        let workload = frontend(3, &[(AVAILABILITY_CLASS, "standard")]);
        let decision = DecisionEngine::new(EnforcementMode::Flexible).decide(&workload, &[], test_start());

        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::Standard);
        assert_eq!(p.parameter, min_percent(50));
        assert_eq!(p.mode, EnforcementMode::Flexible);
    }
}

mod class_thresholds {
    use super::*;

    #[test]
    fn test_standard_with_one_replica_gets_no_pdb() {
        let policies = vec![p1().class(AvailabilityClass::Standard).build()];
        let decision = engine().decide(&frontend(1, &[]), &policies, test_start());
        assert_eq!(
            decision.outcome,
            Outcome::NoPdb {
                reason: SkipReason::BelowMinimumReplicas {
                    class: AvailabilityClass::Standard,
                    replicas: 1
                }
            }
        );
    }

    #[test]
    fn test_explicit_override_ignores_replica_threshold() {
        let policies = vec![
            p1().class(AvailabilityClass::Standard)
                .min_available(IntOrString::Int(1))
                .build(),
        ];
        let decision = engine().decide(&frontend(1, &[]), &policies, test_start());
        let p = protection(&decision.outcome);
        assert_eq!(
            p.parameter,
            DisruptionParameter::MinAvailable(DisruptionValue::Count(1))
        );
    }

    #[test]
    fn test_mission_critical_with_two_replicas_downgrades() {
        let policies = vec![p1().class(AvailabilityClass::MissionCritical).build()];
        let decision = engine().decide(&frontend(2, &[]), &policies, test_start());

        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::HighAvailability);
        assert_eq!(p.parameter, min_percent(75));
        assert_eq!(
            decision.diagnostics,
            vec![Diagnostic::ClassDowngraded {
                from: AvailabilityClass::MissionCritical,
                to: AvailabilityClass::HighAvailability,
                replicas: 2,
            }]
        );
    }

    #[test]
    fn test_high_availability_with_one_replica_degrades_to_nothing() {
        let policies = vec![p1().build()];
        let decision = engine().decide(&frontend(1, &[]), &policies, test_start());

        assert_eq!(
            decision.outcome,
            Outcome::NoPdb {
                reason: SkipReason::BelowMinimumReplicas {
                    class: AvailabilityClass::Standard,
                    replicas: 1
                }
            }
        );
        assert!(decision.diagnostics.contains(&Diagnostic::ClassDowngraded {
            from: AvailabilityClass::HighAvailability,
            to: AvailabilityClass::Standard,
            replicas: 1,
        }));
    }

    #[test]
    fn test_mission_critical_keeps_all_but_one() {
        let policies = vec![p1().class(AvailabilityClass::MissionCritical).build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        let p = protection(&decision.outcome);
        assert_eq!(
            p.parameter,
            DisruptionParameter::MinAvailable(DisruptionValue::Count(4))
        );
    }
}

mod policy_order {
    use super::*;

    #[test]
    fn test_lexical_order_without_priority() {
        let policies = vec![
            PolicyBuilder::new("ns1", "zeta")
                .select("tier", "frontend")
                .class(AvailabilityClass::MissionCritical)
                .build(),
            PolicyBuilder::new("ns1", "alpha")
                .select("tier", "frontend")
                .class(AvailabilityClass::Standard)
                .build(),
        ];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        assert_eq!(protection(&decision.outcome).class, AvailabilityClass::Standard);
    }

    #[test]
    fn test_priority_annotation_wins_over_name() {
        let policies = vec![
            PolicyBuilder::new("ns1", "alpha")
                .select("tier", "frontend")
                .class(AvailabilityClass::Standard)
                .build(),
            PolicyBuilder::new("ns1", "zeta")
                .select("tier", "frontend")
                .class(AvailabilityClass::MissionCritical)
                .priority(10)
                .build(),
        ];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::MissionCritical);
        assert_eq!(
            p.sources[0],
            DecisionSource::Policy {
                namespace: "ns1".to_string(),
                name: "zeta".to_string()
            }
        );
    }
}

mod flexible_mode {
    use super::*;

    fn decide(annotations: &[(&str, &str)]) -> availability_operator::policy::Decision {
        let policies = vec![p1().mode(EnforcementMode::Flexible).build()];
        engine().decide(&frontend(4, annotations), &policies, test_start())
    }

    #[test]
    fn test_more_restrictive_annotation_wins() {
        let decision = decide(&[(MIN_AVAILABLE, "100%")]);
        let p = protection(&decision.outcome);
        assert_eq!(p.parameter, min_percent(100));
        assert!(matches!(p.sources[0], DecisionSource::Policy { .. }));
        assert!(decision.diagnostics.is_empty());
    }

    #[test]
    fn test_less_restrictive_annotation_is_rejected() {
        let decision = decide(&[(MAX_UNAVAILABLE, "50%")]);
        let p = protection(&decision.outcome);
        assert_eq!(p.parameter, min_percent(75));
        assert!(matches!(
            &decision.diagnostics[..],
            [Diagnostic::OverrideRejected { annotation, mode: EnforcementMode::Flexible, .. }]
                if annotation == "max-unavailable"
        ));
    }

    #[test]
    fn test_equal_annotation_keeps_policy_silently() {
        let decision = decide(&[(MIN_AVAILABLE, "3")]);
        let p = protection(&decision.outcome);
        assert_eq!(p.parameter, min_percent(75));
        assert!(decision.diagnostics.is_empty());
    }

    #[test]
    fn test_class_annotation_below_its_threshold_keeps_policy_pdb() {
        for mode in [EnforcementMode::Flexible, EnforcementMode::Advisory] {
            let policies = vec![p1().mode(mode).max_unavailable(IntOrString::Int(1)).build()];
            let workload = frontend(1, &[(AVAILABILITY_CLASS, "standard")]);
            let decision = engine().decide(&workload, &policies, test_start());

            let p = protection(&decision.outcome);
            assert_eq!(
                p.parameter,
                DisruptionParameter::MaxUnavailable(DisruptionValue::Count(1)),
                "{mode}"
            );
            assert!(matches!(
                &decision.diagnostics[..],
                [Diagnostic::OverrideRejected { annotation, mode: m, .. }]
                    if annotation == "availability-class" && *m == mode
            ));
        }
    }

    #[test]
    fn test_class_annotation_meeting_its_threshold_still_wins() {
        let policies = vec![
            p1().mode(EnforcementMode::Flexible)
                .max_unavailable(IntOrString::Int(2))
                .build(),
        ];
        let workload = frontend(3, &[(AVAILABILITY_CLASS, "standard")]);
        let decision = engine().decide(&workload, &policies, test_start());

        // 50% of 3 keeps two pods up, maxUnavailable=2 keeps one
        let p = protection(&decision.outcome);
        assert_eq!(p.class, AvailabilityClass::Standard);
        assert_eq!(p.parameter, min_percent(50));
        assert!(decision.diagnostics.is_empty());
    }
}

mod malformed_input {
    use super::*;

    #[test]
    fn test_out_of_range_percentage_falls_back_to_class_default() {
        let policies = vec![p1().mode(EnforcementMode::Advisory).build()];
        let workload = frontend(4, &[(MIN_AVAILABLE, "150%")]);
        let decision = engine().decide(&workload, &policies, test_start());

        assert_eq!(protection(&decision.outcome).parameter, min_percent(75));
        assert!(matches!(
            &decision.diagnostics[..],
            [Diagnostic::InvalidOverride { source, value, .. }]
                if source == "annotation:min-available" && value == "150%"
        ));
    }

    #[test]
    fn test_contradictory_policy_overrides() {
        let mut policy = p1().build();
        policy.spec.overrides = Some(DisruptionOverrides {
            min_available: Some(IntOrString::Int(2)),
            max_unavailable: Some(IntOrString::Int(1)),
        });
        let decision = engine().decide(&frontend(4, &[]), &[policy], test_start());

        assert_eq!(protection(&decision.outcome).parameter, min_percent(75));
        assert!(matches!(
            &decision.diagnostics[..],
            [Diagnostic::InvalidOverride { source, .. }] if source == "policy:ns1/p1"
        ));
    }

    #[test]
    fn test_negative_count_annotation() {
        let workload = frontend(4, &[(MIN_AVAILABLE, "-1")]);
        let decision = engine().decide(&workload, &[p1().build()], test_start());
        assert!(matches!(
            &decision.diagnostics[..],
            [Diagnostic::InvalidOverride { .. }]
        ));
    }
}

mod maintenance {
    use super::*;

    /// Daily 12:00-13:00 UTC
    fn noon_window(name: &str, max_unavailable: &str) -> MaintenanceWindow {
        relaxing_window(
            name,
            "2024-04-01T12:00:00",
            "1h",
            Recurrence::Daily,
            "UTC",
            max_unavailable,
        )
    }

    #[test]
    fn test_active_window_relaxes_protection() {
        let policies = vec![p1().window(noon_window("lunch", "50%")).build()];
        let decision = engine().decide(&frontend(4, &[]), &policies, test_start());

        let p = protection(&decision.outcome);
        assert!(p.relaxed);
        assert_eq!(
            p.parameter,
            DisruptionParameter::MaxUnavailable(DisruptionValue::Percent(50))
        );
        assert_eq!(p.active_window.as_deref(), Some("ns1/p1#lunch"));
        assert!(decision.has_windows);
    }

    #[test]
    fn test_known_inactive_gate_skips_evaluation() {
        let policies = vec![p1().window(noon_window("lunch", "50%")).build()];
        let decision = engine().decide_with(
            &frontend(4, &[]),
            &policies,
            test_start(),
            MaintenanceGate::KnownInactive,
        );
        let p = protection(&decision.outcome);
        assert!(!p.relaxed);
        assert_eq!(p.parameter, min_percent(75));
        assert!(decision.has_windows);
    }

    #[test]
    fn test_most_relaxed_active_window_wins() {
        let policies = vec![
            p1().window(noon_window("small", "25%"))
                .window(noon_window("large", "75%"))
                .build(),
        ];
        let decision = engine().decide(&frontend(4, &[]), &policies, test_start());
        let p = protection(&decision.outcome);
        assert_eq!(p.active_window.as_deref(), Some("ns1/p1#large"));
    }

    #[test]
    fn test_invalid_windows_are_diagnosed_regardless_of_gate() {
        let mut bad_zone = noon_window("bad", "50%");
        bad_zone.timezone = "Mars/Olympus".to_string();
        let mut no_params = noon_window("empty", "50%");
        no_params.max_unavailable = None;
        let policies = vec![p1().window(bad_zone).window(no_params).build()];

        for gate in [MaintenanceGate::Evaluate, MaintenanceGate::KnownInactive] {
            let decision = engine().decide_with(&frontend(4, &[]), &policies, test_start(), gate);
            assert_eq!(decision.diagnostics.len(), 2);
            assert!(
                decision
                    .diagnostics
                    .iter()
                    .all(|d| matches!(d, Diagnostic::InvalidWindow { .. }))
            );
            assert!(!decision.has_windows);
            assert!(!decision.is_relaxed());
        }
    }

    #[test]
    fn test_annotation_references_another_policy() {
        let policies = vec![
            p1().build(),
            PolicyBuilder::new("ns1", "windows")
                .select("tier", "nothing")
                .window(noon_window("shared", "50%"))
                .build(),
        ];
        let workload = frontend(4, &[(MAINTENANCE_WINDOW, "windows")]);
        let decision = engine().decide(&workload, &policies, test_start());
        let p = protection(&decision.outcome);
        assert_eq!(p.active_window.as_deref(), Some("ns1/windows#shared"));
    }

    #[test]
    fn test_inline_annotation_window() {
        let inline = r#"{"name":"inline","start":"2024-04-01T11:30:00","duration":"1h","recurrence":"daily","timezone":"UTC","maxUnavailable":1}"#;
        let workload = frontend(4, &[(MAINTENANCE_WINDOW, inline)]);
        let decision = engine().decide(&workload, &[p1().build()], test_start());
        let p = protection(&decision.outcome);
        assert_eq!(
            p.parameter,
            DisruptionParameter::MaxUnavailable(DisruptionValue::Count(1))
        );
        assert_eq!(p.active_window.as_deref(), Some("annotation#inline"));
    }

    #[test]
    fn test_dangling_window_reference_is_diagnosed() {
        let workload = frontend(4, &[(MAINTENANCE_WINDOW, "missing")]);
        let decision = engine().decide(&workload, &[p1().build()], test_start());
        assert!(matches!(
            &decision.diagnostics[..],
            [Diagnostic::InvalidWindow { window, .. }] if window == "annotation"
        ));
    }
}

mod determinism {
    use super::*;

    #[test]
    fn test_same_input_same_decision() {
        let policies = vec![p1().build()];
        let workload = frontend(5, &[(AVAILABILITY_CLASS, "standard")]);
        let first = engine().decide(&workload, &policies, test_start());
        let second = engine().decide(&workload, &policies, test_start());
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 16);
    }

    #[test]
    fn test_fingerprint_tracks_outcome() {
        let policies = vec![p1().build()];
        let five = engine().decide(&frontend(5, &[]), &policies, test_start());
        let relaxed = engine().decide(
            &frontend(5, &[]),
            &[p1().window(relaxing_window(
                "w",
                "2024-04-01T12:00:00",
                "1h",
                Recurrence::Daily,
                "UTC",
                "50%",
            ))
            .build()],
            test_start(),
        );
        assert_ne!(five.fingerprint(), relaxed.fingerprint());
    }

    #[test]
    fn test_summary() {
        let policies = vec![p1().build()];
        let decision = engine().decide(&frontend(5, &[]), &policies, test_start());
        assert_eq!(
            decision.summary(),
            "high-availability minAvailable=75% (strict)"
        );
    }
}
