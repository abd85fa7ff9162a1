//! Mirror job executions against the in-memory registry

use mirror_gate_common::{partition, ImageReference};
use mirror_job::{ExecutionContext, InMemoryRegistry, MirrorExecutor, MirrorJob};
use std::sync::Arc;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-east-1";

async fn setup() -> (InMemoryRegistry, MirrorExecutor, MirrorJob, String) {
    let registry = InMemoryRegistry::new(ACCOUNT);
    let source = ImageReference::new("public-registry", "app", "v1");
    let source_digest = registry.publish(&source, b"app v1 layers").await;

    let destination = source.with_registry(partition::private_registry_host(ACCOUNT, REGION));
    let job = MirrorJob::new("mirror-app", source, destination);
    let executor = MirrorExecutor::new(Arc::new(registry.clone()));

    (registry, executor, job, source_digest)
}

#[tokio::test]
async fn test_second_run_overwrites_with_same_digest() {
    let (registry, executor, job, source_digest) = setup().await;
    let context = ExecutionContext::new(REGION);

    let first = executor.run(&job, &context).await.unwrap();
    let after_first = registry.digest_of(&job.destination).await;

    let second = executor.run(&job, &context).await.unwrap();
    let after_second = registry.digest_of(&job.destination).await;

    assert_eq!(first.pushed_digest, source_digest);
    assert_eq!(second.pushed_digest, source_digest);
    assert_eq!(after_first, after_second);
    assert_eq!(registry.push_count().await, 2);
    assert_eq!(
        registry.tags(&job.destination.repository_uri()).await,
        vec!["v1"]
    );
}

#[tokio::test]
async fn test_overlapping_runs_both_succeed() {
    let (registry, executor, job, source_digest) = setup().await;
    let context = ExecutionContext::new(REGION);

    let (a, b) = tokio::join!(executor.run(&job, &context), executor.run(&job, &context));

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(registry.digest_of(&job.destination).await, Some(source_digest));
}

#[tokio::test]
async fn test_fresh_repository_receives_tag() {
    let (registry, executor, job, source_digest) = setup().await;
    assert!(registry
        .tags(&job.destination.repository_uri())
        .await
        .is_empty());

    executor
        .run(&job, &ExecutionContext::new(REGION))
        .await
        .unwrap();

    assert_eq!(registry.digest_of(&job.destination).await, Some(source_digest));
}
