//! Reconcilers driven end to end against the in-memory cloud.

use std::collections::BTreeMap;

use mcs_reconcile::model::{
    AutoExpand, Capability, ClusterCreateOpts, Database, InstanceCreateOpts, NodeGroupCreateOpts,
    NodeGroupLabel, SnapshotCreateOpts, SnapshotUpdateOpts, User, VolumeCreateOpts, VolumeOpts,
    VolumeUpdateOpts,
};
use mcs_reconcile::reconciler::{
    Change, ClusterLayout, ComputeClusterChanges, ComputeClusterReconciler, DatabaseReconciler,
    DatabaseSpec, DbClusterChanges, DbClusterReconciler, DbClusterSpec, InstanceChanges,
    InstanceReconciler, InstanceSpec, NodeGroupChanges, NodeGroupReconciler, PowerState,
    Reconciler, Shard, SnapshotChanges, SnapshotReconciler, UserChanges, UserReconciler, UserSpec,
    VolumeChanges, VolumeReconciler,
};
use mcs_reconcile::test_util::{
    FakeCloud, test_cluster_member_opts, test_compute_cluster, test_datastore, test_db_cluster,
    test_instance, test_member, test_node_group, test_timeouts, test_volume,
};
use mcs_reconcile::ReconcileError;

fn instance_opts(name: &str) -> InstanceCreateOpts {
    InstanceCreateOpts {
        name: name.to_string(),
        flavor_ref: "flavor-small".to_string(),
        volume: VolumeOpts {
            size: 10,
            volume_type: Some("ceph-ssd".to_string()),
        },
        datastore: test_datastore("mysql"),
        nics: Vec::new(),
        availability_zone: Some("ms1".to_string()),
        configuration: None,
        replica_of: None,
        keypair: None,
        wal_volume: None,
        capabilities: Vec::new(),
    }
}

fn capability(name: &str) -> Capability {
    Capability {
        name: name.to_string(),
        params: BTreeMap::new(),
    }
}

fn names(calls: &[&str]) -> Vec<String> {
    calls.iter().map(|c| c.to_string()).collect()
}

mod instance {
    use super::*;

    #[test]
    fn test_create_waits_then_applies_post_create_settings() {
        let cloud = FakeCloud::new();
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let spec = InstanceSpec {
            opts: instance_opts("orders"),
            root_enabled: true,
            root_password: None,
            auto_expand: Some(AutoExpand {
                enabled: true,
                max_disk_size: 100,
            }),
        };

        let (id, report) = reconciler.create_instance(&spec).unwrap();

        assert_eq!(
            cloud.call_names(),
            names(&["create_instance", "enable_root", "update_autoexpand"])
        );
        let root = report.root_user.expect("root credentials");
        assert_eq!(root.name, "root");
        assert_eq!(root.password, "generated");
        let instance = reconciler.read(&id).unwrap().unwrap();
        assert_eq!(instance.status, "ACTIVE");
    }

    #[test]
    fn test_enabling_root_returns_requested_password() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            root_enabled: Some(true),
            root_password: Some("Sup3r-secret".to_string()),
            ..Default::default()
        };

        let report = reconciler.update("inst-1", &changes).unwrap();

        assert_eq!(report.completed, names(&["set root user"]));
        assert_eq!(report.root_user.unwrap().password, "Sup3r-secret");
        assert_eq!(cloud.call_names(), names(&["enable_root"]));
    }

    #[test]
    fn test_create_rejects_unknown_zone() {
        let cloud = FakeCloud::new();
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let mut opts = instance_opts("orders");
        opts.availability_zone = Some("gz1".to_string());
        let spec = InstanceSpec {
            opts,
            root_enabled: false,
            root_password: None,
            auto_expand: None,
        };

        let err = reconciler.create(&spec).unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_update_runs_steps_in_order() {
        let cloud = FakeCloud::new();
        let mut instance = test_instance("inst-1", "ACTIVE", "mysql");
        instance.configuration = Some(mcs_reconcile::model::Link {
            id: "cfg-old".to_string(),
        });
        cloud.insert_instance(instance);
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            configuration: Some(Change::new(
                Some("cfg-old".to_string()),
                Some("cfg-new".to_string()),
            )),
            volume_size: Some(20),
            flavor_ref: Some("flavor-large".to_string()),
            root_enabled: Some(false),
            capabilities: Some(vec![capability("node_exporter")]),
            ..Default::default()
        };

        let report = reconciler.update("inst-1", &changes).unwrap();

        assert_eq!(
            cloud.call_names(),
            names(&[
                "detach_configuration",
                "attach_configuration",
                "resize_volume",
                "resize_flavor",
                "disable_root",
                "apply_capabilities",
            ])
        );
        assert_eq!(report.completed.len(), 6);
        let instance = cloud.instance("inst-1").unwrap();
        assert_eq!(instance.configuration.unwrap().id, "cfg-new");
        assert_eq!(instance.volume.unwrap().size, 20);
        assert_eq!(instance.flavor.unwrap().id, "flavor-large");
        assert_eq!(instance.status, "ACTIVE");
    }

    #[test]
    fn test_configuration_attach_without_previous() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            configuration: Some(Change::new(None, Some("cfg-1".to_string()))),
            ..Default::default()
        };

        reconciler.update("inst-1", &changes).unwrap();

        assert_eq!(cloud.call_names(), names(&["attach_configuration"]));
    }

    #[test]
    fn test_detach_replica_waits_for_detach() {
        let cloud = FakeCloud::new();
        let mut replica = test_instance("inst-2", "ACTIVE", "postgresql");
        replica.replica_of = Some(mcs_reconcile::model::Link {
            id: "inst-1".to_string(),
        });
        cloud.insert_instance(replica);
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            detach_replica: true,
            ..Default::default()
        };

        let report = reconciler.update("inst-2", &changes).unwrap();

        assert_eq!(report.completed, vec!["detach replica".to_string()]);
        assert!(cloud.instance("inst-2").unwrap().replica_of.is_none());
    }

    #[test]
    fn test_failed_step_stops_later_steps() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.fail_next("resize_flavor", 409);
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            volume_size: Some(20),
            flavor_ref: Some("flavor-large".to_string()),
            capabilities: Some(vec![capability("node_exporter")]),
            ..Default::default()
        };

        let err = reconciler.update("inst-1", &changes).unwrap_err();

        match err {
            ReconcileError::StepFailed {
                step,
                total,
                name,
                completed,
                source,
            } => {
                assert_eq!((step, total), (2, 3));
                assert_eq!(name, "resize flavor");
                assert_eq!(completed, vec!["resize volume".to_string()]);
                assert!(matches!(*source, ReconcileError::Transport(_)));
            }
            other => panic!("expected step failure, got {other:?}"),
        }
        assert_eq!(
            cloud.call_names(),
            names(&["resize_volume", "resize_flavor"])
        );
        assert_eq!(cloud.instance("inst-1").unwrap().volume.unwrap().size, 20);
    }

    #[test]
    fn test_backend_error_during_wait() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.script("inst-1", &["ERROR"]);
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());
        let changes = InstanceChanges {
            volume_size: Some(20),
            ..Default::default()
        };

        let err = reconciler.update("inst-1", &changes).unwrap_err();

        assert!(matches!(
            &err,
            ReconcileError::StepFailed { step: 1, source, .. }
                if matches!(**source, ReconcileError::ErrorState { .. })
        ));
    }

    #[test]
    fn test_delete_waits_until_gone_and_is_idempotent() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        let reconciler = InstanceReconciler::new(cloud.clone(), &test_timeouts());

        reconciler.delete("inst-1").unwrap();
        assert!(cloud.instance("inst-1").is_none());
        assert!(reconciler.read("inst-1").unwrap().is_none());

        reconciler.delete("inst-1").unwrap();
    }
}

mod db_cluster {
    use super::*;

    fn sharded_spec() -> DbClusterSpec {
        DbClusterSpec {
            name: "events".to_string(),
            datastore: test_datastore("mongodb"),
            layout: ClusterLayout::Sharded(vec![
                Shard {
                    shard_id: "shard-0".to_string(),
                    size: 2,
                    instance: test_cluster_member_opts(Some("dp1")),
                },
                Shard {
                    shard_id: "shard-1".to_string(),
                    size: 1,
                    instance: test_cluster_member_opts(Some("ms1")),
                },
            ]),
            configuration: Some("cfg-1".to_string()),
            capabilities: Vec::new(),
            floating_ip_enabled: false,
            auto_expand: None,
            wal_auto_expand: None,
        }
    }

    #[test]
    fn test_create_sends_network_and_auto_expand_options() {
        let cloud = FakeCloud::new();
        let reconciler = DbClusterReconciler::sharded(cloud.clone(), &test_timeouts());
        let spec = DbClusterSpec {
            floating_ip_enabled: true,
            auto_expand: Some(AutoExpand {
                enabled: true,
                max_disk_size: 1000,
            }),
            wal_auto_expand: Some(AutoExpand {
                enabled: true,
                max_disk_size: 200,
            }),
            ..sharded_spec()
        };

        reconciler.create(&spec).unwrap();

        let creates = cloud.db_cluster_creates();
        assert_eq!(creates.len(), 1);
        assert!(creates[0].floating_ip_enabled);
        assert_eq!(creates[0].auto_expand.unwrap().max_disk_size, 1000);
        assert_eq!(creates[0].wal_auto_expand.unwrap().max_disk_size, 200);
        assert_eq!(creates[0].instances.len(), 3);
    }

    #[test]
    fn test_sharded_create_then_delete() {
        let cloud = FakeCloud::new();
        let reconciler = DbClusterReconciler::sharded(cloud.clone(), &test_timeouts());

        let id = reconciler.create(&sharded_spec()).unwrap();

        let cluster = cloud.db_cluster(&id).unwrap();
        assert!(cluster.is_sharded());
        assert_eq!(cluster.instances.len(), 3);
        assert_eq!(cluster.configuration_id.as_deref(), Some("cfg-1"));
        assert_eq!(
            cloud.call_names(),
            names(&["create_db_cluster", "attach_configuration"])
        );

        // Members drain first; an empty listing reads as deleted.
        reconciler.delete(&id).unwrap();
        assert!(reconciler.read(&id).unwrap().is_none());
    }

    #[test]
    fn test_layout_must_match_reconciler() {
        let cloud = FakeCloud::new();
        let reconciler = DbClusterReconciler::replicated(cloud.clone(), &test_timeouts());

        let err = reconciler.create(&sharded_spec()).unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_empty_layout_is_rejected() {
        let cloud = FakeCloud::new();
        let reconciler = DbClusterReconciler::replicated(cloud.clone(), &test_timeouts());
        let spec = DbClusterSpec {
            name: "empty".to_string(),
            datastore: test_datastore("galera_mysql"),
            layout: ClusterLayout::Replicated {
                size: 0,
                instance: test_cluster_member_opts(None),
            },
            configuration: None,
            capabilities: Vec::new(),
            floating_ip_enabled: false,
            auto_expand: None,
            wal_auto_expand: None,
        };

        assert!(matches!(
            reconciler.create(&spec),
            Err(ReconcileError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_update_swaps_configuration_then_auto_expand() {
        let cloud = FakeCloud::new();
        let mut cluster = test_db_cluster(
            "cluster-1",
            "galera_mysql",
            vec![
                test_member("m-1", "ACTIVE", None),
                test_member("m-2", "ACTIVE", None),
            ],
        );
        cluster.configuration_id = Some("cfg-old".to_string());
        cloud.insert_db_cluster(cluster);
        let reconciler = DbClusterReconciler::replicated(cloud.clone(), &test_timeouts());
        let changes = DbClusterChanges {
            configuration: Some(Change::new(
                Some("cfg-old".to_string()),
                Some("cfg-new".to_string()),
            )),
            auto_expand: Some(AutoExpand {
                enabled: true,
                max_disk_size: 200,
            }),
            capabilities: None,
        };

        let report = reconciler.update("cluster-1", &changes).unwrap();

        assert_eq!(
            report.completed,
            names(&[
                "detach configuration",
                "attach configuration",
                "update disk auto-expand",
            ])
        );
        assert_eq!(
            cloud.db_cluster("cluster-1").unwrap().configuration_id.as_deref(),
            Some("cfg-new")
        );
    }
}

mod database {
    use super::*;

    #[test]
    fn test_create_read_delete_on_instance() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "postgresql"));
        let reconciler = DatabaseReconciler::new(cloud.clone(), &test_timeouts());
        let spec = DatabaseSpec {
            dbms_id: "inst-1".to_string(),
            database: Database::named("orders"),
        };

        let id = reconciler.create(&spec).unwrap();
        assert_eq!(id, "inst-1/orders");
        assert_eq!(reconciler.read(&id).unwrap().unwrap().name, "orders");

        reconciler.delete(&id).unwrap();
        assert!(cloud.databases("inst-1").is_empty());
        assert!(reconciler.read(&id).unwrap().is_none());
    }

    #[test]
    fn test_create_on_cluster() {
        let cloud = FakeCloud::new();
        cloud.insert_db_cluster(test_db_cluster(
            "cluster-1",
            "mysql",
            vec![test_member("m-1", "ACTIVE", None)],
        ));
        let reconciler = DatabaseReconciler::new(cloud.clone(), &test_timeouts());
        let spec = DatabaseSpec {
            dbms_id: "cluster-1".to_string(),
            database: Database::named("orders"),
        };

        assert_eq!(reconciler.create(&spec).unwrap(), "cluster-1/orders");
        assert_eq!(cloud.databases("cluster-1").len(), 1);
    }

    #[test]
    fn test_redis_and_replicas_have_no_databases() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("cache-1", "ACTIVE", "redis"));
        let mut replica = test_instance("inst-2", "ACTIVE", "mysql");
        replica.replica_of = Some(mcs_reconcile::model::Link {
            id: "inst-1".to_string(),
        });
        cloud.insert_instance(replica);
        let reconciler = DatabaseReconciler::new(cloud.clone(), &test_timeouts());

        for dbms_id in ["cache-1", "inst-2"] {
            let spec = DatabaseSpec {
                dbms_id: dbms_id.to_string(),
                database: Database::named("orders"),
            };
            assert!(matches!(
                reconciler.create(&spec),
                Err(ReconcileError::Unsupported(_))
            ));
        }
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_missing_dbms() {
        let cloud = FakeCloud::new();
        let reconciler = DatabaseReconciler::new(cloud.clone(), &test_timeouts());
        let spec = DatabaseSpec {
            dbms_id: "nope".to_string(),
            database: Database::named("orders"),
        };

        let err = reconciler.create(&spec).unwrap_err();
        assert!(matches!(err, ReconcileError::NoSuchKind { .. }));
        assert!(reconciler.read("nope/orders").unwrap().is_none());
        reconciler.delete("nope/orders").unwrap();
    }

    #[test]
    fn test_update_and_bad_ids() {
        let cloud = FakeCloud::new();
        let reconciler = DatabaseReconciler::new(cloud, &test_timeouts());

        assert!(matches!(
            reconciler.update("inst-1/orders", &()),
            Err(ReconcileError::Unsupported(_))
        ));
        assert!(matches!(
            reconciler.read("no-separator"),
            Err(ReconcileError::InvalidId(_))
        ));
    }
}

mod user {
    use super::*;
    use mcs_reconcile::model::DatabaseRef;

    fn grant(name: &str) -> DatabaseRef {
        DatabaseRef {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_create_with_grants() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        let reconciler = UserReconciler::new(cloud.clone(), &test_timeouts());
        let spec = UserSpec {
            dbms_id: "inst-1".to_string(),
            name: "app".to_string(),
            password: "s3cret-pass".to_string(),
            host: None,
            databases: vec!["orders".to_string()],
        };

        let id = reconciler.create(&spec).unwrap();

        assert_eq!(id, "inst-1/app");
        let user = reconciler.read(&id).unwrap().unwrap();
        assert_eq!(user.database_names(), vec!["orders".to_string()]);
    }

    #[test]
    fn test_update_revokes_before_granting_then_renames() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.insert_user(
            "inst-1",
            User {
                name: "app".to_string(),
                host: None,
                databases: vec![grant("db2"), grant("db3")],
            },
        );
        let reconciler = UserReconciler::new(cloud.clone(), &test_timeouts());
        let changes = UserChanges {
            databases: Some(vec!["db1".to_string(), "db2".to_string()]),
            name: Some("app2".to_string()),
            ..Default::default()
        };

        let report = reconciler.update("inst-1/app", &changes).unwrap();

        assert_eq!(
            report.completed,
            names(&["revoke databases", "grant databases", "update user"])
        );
        assert_eq!(
            cloud.calls(),
            names(&[
                "revoke_database inst-1/app db3",
                "grant_databases inst-1/app db1",
                "update_user inst-1/app",
            ])
        );
        let users = cloud.users("inst-1");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "app2");
        assert_eq!(users[0].databases, vec![grant("db2"), grant("db1")]);
    }

    #[test]
    fn test_revoke_only_update_waits_for_user() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.insert_user(
            "inst-1",
            User {
                name: "app".to_string(),
                host: None,
                databases: vec![grant("db1"), grant("db2")],
            },
        );
        let reconciler = UserReconciler::new(cloud.clone(), &test_timeouts());
        let changes = UserChanges {
            databases: Some(vec!["db1".to_string()]),
            ..Default::default()
        };

        let report = reconciler.update("inst-1/app", &changes).unwrap();

        assert_eq!(report.completed, names(&["revoke databases"]));
        let settled = report.last.expect("revoke should wait for the user");
        assert_eq!(settled.resource().unwrap().id, "inst-1/app");
        assert_eq!(cloud.calls(), names(&["revoke_database inst-1/app db2"]));
        assert_eq!(cloud.users("inst-1")[0].databases, vec![grant("db1")]);
    }

    #[test]
    fn test_update_with_matching_grants_is_noop() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.insert_user(
            "inst-1",
            User {
                name: "app".to_string(),
                host: None,
                databases: vec![grant("db1")],
            },
        );
        let reconciler = UserReconciler::new(cloud.clone(), &test_timeouts());
        let changes = UserChanges {
            databases: Some(vec!["db1".to_string()]),
            name: Some("app".to_string()),
            ..Default::default()
        };

        let report = reconciler.update("inst-1/app", &changes).unwrap();

        assert!(report.completed.is_empty());
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_delete() {
        let cloud = FakeCloud::new();
        cloud.insert_instance(test_instance("inst-1", "ACTIVE", "mysql"));
        cloud.insert_user(
            "inst-1",
            User {
                name: "app".to_string(),
                host: None,
                databases: Vec::new(),
            },
        );
        let reconciler = UserReconciler::new(cloud.clone(), &test_timeouts());

        reconciler.delete("inst-1/app").unwrap();

        assert!(cloud.users("inst-1").is_empty());
        reconciler.delete("inst-1/app").unwrap();
    }
}

mod compute_cluster {
    use super::*;

    fn create_opts(name: &str) -> ClusterCreateOpts {
        ClusterCreateOpts {
            name: name.to_string(),
            cluster_template_id: "template-1".to_string(),
            network_id: "net-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            availability_zone: Some("ms1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_delete() {
        let cloud = FakeCloud::new();
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());

        let id = reconciler.create(&create_opts("prod-k8s")).unwrap();
        assert_eq!(cloud.compute_cluster(&id).unwrap().new_status, "RUNNING");

        reconciler.delete(&id).unwrap();
        assert!(cloud.compute_cluster(&id).is_none());
    }

    #[test]
    fn test_create_rejects_bad_name() {
        let cloud = FakeCloud::new();
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());

        let err = reconciler.create(&create_opts("9-lives")).unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_shut_off_cluster_powers_on_first() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "SHUTOFF"));
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());
        let changes = ComputeClusterChanges {
            cluster_template_id: Some("template-2".to_string()),
            master_flavor: Some("flavor-large".to_string()),
            power: Some(PowerState::Running),
        };

        let report = reconciler.update("k8s-1", &changes).unwrap();

        assert_eq!(
            report.completed,
            names(&["turn on cluster", "upgrade cluster template", "resize masters"])
        );
        let cluster = cloud.compute_cluster("k8s-1").unwrap();
        assert_eq!(cluster.new_status, "RUNNING");
        assert_eq!(cluster.cluster_template_id, "template-2");
        assert_eq!(cluster.master_flavor_id.as_deref(), Some("flavor-large"));
    }

    #[test]
    fn test_changes_to_shut_off_cluster_need_power_on() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "SHUTOFF"));
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());
        let changes = ComputeClusterChanges {
            master_flavor: Some("flavor-large".to_string()),
            ..Default::default()
        };

        let err = reconciler.update("k8s-1", &changes).unwrap_err();

        assert!(matches!(err, ReconcileError::Unsupported(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_power_off_runs_last() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RUNNING"));
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());
        let changes = ComputeClusterChanges {
            master_flavor: Some("flavor-large".to_string()),
            power: Some(PowerState::ShutOff),
            ..Default::default()
        };

        reconciler.update("k8s-1", &changes).unwrap();

        assert_eq!(
            cloud.call_names(),
            names(&["resize_masters", "turn_off_cluster"])
        );
        assert_eq!(cloud.compute_cluster("k8s-1").unwrap().new_status, "SHUTOFF");
    }

    #[test]
    fn test_busy_cluster_refuses_changes() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RECONCILING"));
        let reconciler = ComputeClusterReconciler::new(cloud.clone(), &test_timeouts());

        let err = reconciler
            .update("k8s-1", &ComputeClusterChanges::default())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Unsupported(_)));
    }
}

mod node_group {
    use super::*;

    #[test]
    fn test_create_waits_on_parent_cluster() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RUNNING"));
        let reconciler = NodeGroupReconciler::new(cloud.clone(), &test_timeouts());
        let opts = NodeGroupCreateOpts {
            cluster_id: "k8s-1".to_string(),
            name: "workers".to_string(),
            node_count: 2,
            max_nodes: 4,
            min_nodes: 1,
            ..Default::default()
        };

        let id = reconciler.create(&opts).unwrap();

        assert_eq!(cloud.node_group(&id).unwrap().node_count, 2);
        assert_eq!(cloud.compute_cluster("k8s-1").unwrap().new_status, "RUNNING");
    }

    #[test]
    fn test_create_rejects_inverted_bounds() {
        let cloud = FakeCloud::new();
        let reconciler = NodeGroupReconciler::new(cloud.clone(), &test_timeouts());
        let opts = NodeGroupCreateOpts {
            cluster_id: "k8s-1".to_string(),
            name: "workers".to_string(),
            node_count: 2,
            max_nodes: 1,
            min_nodes: 3,
            ..Default::default()
        };

        assert!(matches!(
            reconciler.create(&opts),
            Err(ReconcileError::InvalidSpec(_))
        ));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_update_scales_then_patches() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RUNNING"));
        cloud.insert_node_group(test_node_group("ng-1", "k8s-1", 3));
        let reconciler = NodeGroupReconciler::new(cloud.clone(), &test_timeouts());
        let changes = NodeGroupChanges {
            node_count: Some(5),
            max_nodes: Some(8),
            labels: Some(vec![NodeGroupLabel {
                key: "tier".to_string(),
                value: "batch".to_string(),
            }]),
            ..Default::default()
        };

        let report = reconciler.update("ng-1", &changes).unwrap();

        assert_eq!(
            report.completed,
            names(&["scale node group", "patch node group"])
        );
        assert_eq!(
            cloud.calls(),
            names(&[
                "scale_node_group ng-1 2",
                "patch_node_group ng-1 /max_nodes,/labels",
            ])
        );
        let group = cloud.node_group("ng-1").unwrap();
        assert_eq!(group.node_count, 5);
        assert_eq!(group.max_nodes, 8);
        assert_eq!(group.labels.len(), 1);
    }

    #[test]
    fn test_update_without_differences_does_nothing() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RUNNING"));
        cloud.insert_node_group(test_node_group("ng-1", "k8s-1", 3));
        let reconciler = NodeGroupReconciler::new(cloud.clone(), &test_timeouts());
        let changes = NodeGroupChanges {
            node_count: Some(3),
            autoscaling_enabled: Some(false),
            ..Default::default()
        };

        let report = reconciler.update("ng-1", &changes).unwrap();

        assert!(report.completed.is_empty());
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_delete_waits_on_parent_cluster() {
        let cloud = FakeCloud::new();
        cloud.insert_compute_cluster(test_compute_cluster("k8s-1", "RUNNING"));
        cloud.insert_node_group(test_node_group("ng-1", "k8s-1", 3));
        let reconciler = NodeGroupReconciler::new(cloud.clone(), &test_timeouts());

        reconciler.delete("ng-1").unwrap();

        assert!(cloud.node_group("ng-1").is_none());
        assert_eq!(cloud.compute_cluster("k8s-1").unwrap().new_status, "RUNNING");
        reconciler.delete("ng-1").unwrap();
    }
}

mod volume {
    use super::*;

    #[test]
    fn test_create_and_delete() {
        let cloud = FakeCloud::new();
        let reconciler = VolumeReconciler::new(cloud.clone(), &test_timeouts());
        let opts = VolumeCreateOpts {
            size: 10,
            availability_zone: "dp1".to_string(),
            volume_type: "ceph-ssd".to_string(),
            name: Some("data".to_string()),
            ..Default::default()
        };

        let id = reconciler.create(&opts).unwrap();
        assert_eq!(cloud.volume(&id).unwrap().status, "available");

        reconciler.delete(&id).unwrap();
        assert!(reconciler.read(&id).unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_unknown_zone() {
        let cloud = FakeCloud::new();
        let reconciler = VolumeReconciler::new(cloud.clone(), &test_timeouts());
        let opts = VolumeCreateOpts {
            size: 10,
            availability_zone: "gz1".to_string(),
            volume_type: "ceph-ssd".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            reconciler.create(&opts),
            Err(ReconcileError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_extend_then_single_retype() {
        let cloud = FakeCloud::new();
        cloud.insert_volume(test_volume("vol-1", "available", 10));
        let reconciler = VolumeReconciler::new(cloud.clone(), &test_timeouts());
        let changes = VolumeChanges {
            attributes: VolumeUpdateOpts {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
            size: Some(20),
            volume_type: Some("ceph-hdd".to_string()),
            availability_zone: Some("ms1".to_string()),
        };

        let report = reconciler.update("vol-1", &changes).unwrap();

        assert_eq!(
            report.completed,
            names(&["update attributes", "extend volume", "retype volume"])
        );
        assert_eq!(
            cloud.calls(),
            names(&[
                "update_volume vol-1",
                "extend_volume vol-1 20",
                "retype_volume vol-1 ceph-hdd ms1",
            ])
        );
        let volume = cloud.volume("vol-1").unwrap();
        assert_eq!(volume.size, 20);
        assert_eq!(volume.volume_type, "ceph-hdd");
        assert_eq!(volume.availability_zone, "ms1");
        assert_eq!(volume.name.as_deref(), Some("renamed"));
    }

    #[test]
    fn test_shrink_is_rejected_before_any_call() {
        let cloud = FakeCloud::new();
        cloud.insert_volume(test_volume("vol-1", "available", 10));
        let reconciler = VolumeReconciler::new(cloud.clone(), &test_timeouts());
        let changes = VolumeChanges {
            size: Some(5),
            ..Default::default()
        };

        assert!(matches!(
            reconciler.update("vol-1", &changes),
            Err(ReconcileError::InvalidSpec(_))
        ));
        assert!(cloud.calls().is_empty());
    }
}

mod snapshot {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let cloud = FakeCloud::new();
        cloud.insert_volume(test_volume("vol-1", "available", 10));
        let reconciler = SnapshotReconciler::new(cloud.clone(), &test_timeouts());
        let opts = SnapshotCreateOpts {
            volume_id: "vol-1".to_string(),
            name: Some("nightly".to_string()),
            ..Default::default()
        };

        let id = reconciler.create(&opts).unwrap();
        assert_eq!(cloud.snapshot(&id).unwrap().status, "available");

        let metadata = BTreeMap::from([("retention".to_string(), "7d".to_string())]);
        let changes = SnapshotChanges {
            attributes: SnapshotUpdateOpts {
                description: Some("nightly backup".to_string()),
                ..Default::default()
            },
            metadata: Some(metadata.clone()),
        };
        let report = reconciler.update(&id, &changes).unwrap();
        assert_eq!(
            report.completed,
            names(&["update attributes", "update metadata"])
        );
        assert!(report.last.is_none());
        assert_eq!(cloud.snapshot(&id).unwrap().metadata, metadata);

        reconciler.delete(&id).unwrap();
        assert!(reconciler.read(&id).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_of_missing_volume() {
        let cloud = FakeCloud::new();
        let reconciler = SnapshotReconciler::new(cloud, &test_timeouts());
        let opts = SnapshotCreateOpts {
            volume_id: "vol-9".to_string(),
            ..Default::default()
        };

        let err = reconciler.create(&opts).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, ReconcileError::Transport(_)));
    }
}
