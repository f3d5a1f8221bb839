//! The test-only super-admin override, exposed through the runtime.
#![cfg(feature = "test-support")]

use scopeacl_domain::{ParentRegistry, PolicyRegistry, Subject};
use scopeacl_server::{Environment, MemoryRuntime, RuntimeError, ServerConfig};

fn runtime(environment: Environment) -> MemoryRuntime {
    let config = ServerConfig {
        environment,
        ..Default::default()
    };
    MemoryRuntime::from_config(config, ParentRegistry::new(), PolicyRegistry::new()).unwrap()
}

#[tokio::test]
async fn test_override_grants_everything_outside_production() {
    let runtime = runtime(Environment::Test);
    let session = runtime.session();

    runtime.act_as_super_admin(&session, 5).await.unwrap();

    assert!(session.is_super_admin(5).await.unwrap());
    assert!(session
        .check(5, "delete:anything", Subject::Root)
        .await
        .unwrap());
    // Later units of work see it too, until invalidated.
    assert!(runtime.session().is_super_admin(5).await.unwrap());

    runtime.ops().invalidate_all_levels(5).await.unwrap();
    assert!(!runtime.session().is_super_admin(5).await.unwrap());
}

#[tokio::test]
async fn test_override_is_refused_in_production() {
    let runtime = runtime(Environment::Production);
    let session = runtime.session();

    let err = runtime.act_as_super_admin(&session, 5).await.unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::NotPermitted {
            operation: "act_as_super_admin",
            environment: Environment::Production,
        }
    ));
    assert_eq!(
        err.to_string(),
        "act_as_super_admin is not permitted in the production environment"
    );
    assert!(!session.is_super_admin(5).await.unwrap());
}
