//! Unit tests for the adaptive circuit-breaking client

use std::sync::Arc;
use std::time::Duration;

use availability_operator::client::{
    AdaptiveClient, AdaptiveConfig, BreakerState, ClusterClient, ClusterMetrics, Operation,
};
use availability_operator::clock::{Clock, ManualClock};
use availability_operator::controller::Error;
use availability_operator::policy::ObjectKey;

use crate::common::*;

fn adaptive() -> (AdaptiveClient<FakeClient>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(test_start()));
    let client = AdaptiveClient::new(FakeClient::new(), AdaptiveConfig::default(), clock.clone());
    (client, clock)
}

fn server_error() -> Error {
    api_error(500, "InternalError")
}

mod forwarding {
    use super::*;

    #[tokio::test]
    async fn test_calls_reach_the_wrapped_client() {
        let (client, _) = adaptive();
        let key = client
            .inner()
            .add_workload(create_test_workload("ns1", "api", 3, &[("app", "api")]));

        let workload = client.get_workload(&key).await.unwrap();
        assert!(workload.is_some());
        let listed = client.list_workloads(Some("ns1"), Some(1)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(client.inner().count_calls("get_workload"), 1);
        assert_eq!(client.inner().count_calls("list_workloads"), 1);
    }

    #[tokio::test]
    async fn test_probe_issues_lightweight_reads() {
        let (client, _) = adaptive();
        client.probe().await;

        let rounds = client.config().probe_rounds as usize;
        assert_eq!(client.inner().count_calls("list_namespaces"), rounds);
        assert_eq!(client.inner().count_calls("list_workloads"), rounds);
        assert_eq!(client.inner().count_calls("list_policies"), rounds);
    }
}

mod classification {
    use super::*;

    #[tokio::test]
    async fn test_not_found_and_conflict_count_as_success() {
        let (client, _) = adaptive();
        let key = ObjectKey::new("ns1", "api-pdb");
        for _ in 0..6 {
            client.inner().fail_next("delete_pdb", not_found());
        }
        for _ in 0..6 {
            assert!(client.delete_pdb(&key).await.unwrap_err().is_not_found());
        }

        let mut pdb = create_foreign_pdb("ns1", "api-pdb");
        client.inner().add_pdb(pdb.clone());
        pdb.metadata.resource_version = Some("stale".to_string());
        for _ in 0..6 {
            assert!(client.update_pdb(&pdb).await.unwrap_err().is_conflict());
        }

        for operation in [Operation::Delete, Operation::Update] {
            let breaker = client.breaker(operation);
            assert_eq!(breaker.state(), BreakerState::Closed);
            assert_eq!(breaker.counts().total_failures, 0);
        }
    }

    #[tokio::test]
    async fn test_already_exists_counts_as_failure() {
        let (client, _) = adaptive();
        client.inner().add_pdb(create_foreign_pdb("ns1", "api-pdb"));
        let err = client
            .create_pdb(&create_foreign_pdb("ns1", "api-pdb"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(client.breaker(Operation::Create).counts().total_failures, 1);
    }
}

mod breaker {
    use super::*;

    #[tokio::test]
    async fn test_failure_ratio_opens_and_fails_fast() {
        let (client, _) = adaptive();
        for _ in 0..3 {
            client.inner().fail_next("list_policies", server_error());
        }
        for _ in 0..3 {
            assert!(client.list_policies(None, None).await.is_err());
        }
        assert_eq!(client.breaker(Operation::List).state(), BreakerState::Open);

        let err = client.list_policies(None, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::CircuitOpen {
                operation: Operation::List,
                state: BreakerState::Open
            }
        ));
        // Rejected without reaching the cluster
        assert_eq!(client.inner().count_calls("list_policies"), 3);
        // Other operations keep their own breaker
        assert!(client.get_policy(&ObjectKey::new("ns1", "p1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_half_open_probes_close_the_breaker() {
        let (client, clock) = adaptive();
        for _ in 0..3 {
            client.inner().fail_next("get_policy", server_error());
        }
        let key = ObjectKey::new("ns1", "p1");
        for _ in 0..3 {
            assert!(client.get_policy(&key).await.is_err());
        }
        let breaker = client.breaker(Operation::Get);
        assert_eq!(breaker.state(), BreakerState::Open);

        clock.advance(breaker.settings().timeout + Duration::from_secs(1));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let probes = breaker.settings().max_requests;
        for _ in 0..probes {
            assert!(client.get_policy(&key).await.is_ok());
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (client, clock) = adaptive();
        for _ in 0..4 {
            client.inner().fail_next("list_namespaces", server_error());
        }
        for _ in 0..3 {
            assert!(client.list_namespaces(None).await.is_err());
        }
        let breaker = client.breaker(Operation::List);
        clock.advance(breaker.settings().timeout + Duration::from_secs(1));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        assert!(client.list_namespaces(None).await.is_err());
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}

mod adaptation {
    use super::*;

    fn degraded() -> ClusterMetrics {
        ClusterMetrics {
            p50: Duration::from_millis(500),
            p95: Duration::from_secs(2),
            p99: Duration::from_secs(5),
            error_rate: 0.2,
            throughput: 30.0,
            sample_count: 500,
            computed_at: None,
        }
    }

    #[tokio::test]
    async fn test_no_adjustment_during_learning_period() {
        let (client, clock) = adaptive();
        let _ = client.list_namespaces(None).await;
        clock.advance(Duration::from_secs(60));
        assert!(client.adjust_with(&degraded(), clock.now()).is_empty());
    }

    #[tokio::test]
    async fn test_adjustment_respects_cooldown() {
        let (client, clock) = adaptive();
        let _ = client.list_namespaces(None).await;
        let _ = client.get_pdb(&ObjectKey::new("ns1", "api-pdb")).await;

        clock.advance(Duration::from_secs(121));
        let changed = client.adjust_with(&degraded(), clock.now());
        assert_eq!(changed, vec![Operation::Get, Operation::List]);

        let get = client.breaker(Operation::Get).settings();
        assert_eq!(get.timeout, Duration::from_secs(15));
        assert_eq!(get.failure_ratio, 0.7);
        assert_eq!(get.max_requests, 10);
        assert_eq!(get.consecutive_failures, 10);
        // List carries its 1.5x bias
        assert_eq!(
            client.breaker(Operation::List).settings().timeout,
            Duration::from_secs_f64(22.5)
        );

        let healthy = ClusterMetrics {
            p99: Duration::from_secs(30),
            error_rate: 0.0,
            ..degraded()
        };
        clock.advance(Duration::from_secs(30));
        assert!(client.adjust_with(&healthy, clock.now()).is_empty());

        clock.advance(Duration::from_secs(31));
        assert_eq!(
            client.adjust_with(&healthy, clock.now()),
            vec![Operation::Get, Operation::List]
        );
    }
}
