use std::sync::Arc;

use async_trait::async_trait;

use super::{ElementRegistry, TYPE_RECORDER};
use crate::{
    config::{Config, RecorderConfig},
    element::{Element, ElementInfo},
    error::{Error, Result},
    sample::Sample,
};

struct NullElement;

#[async_trait]
impl Element for NullElement {
    async fn write(&self, _sample: Arc<Sample>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn test_unknown_type_is_not_found() {
    let registry = ElementRegistry::with_defaults();
    let info = ElementInfo::new("pipe", "Nope");
    let result = registry.resolve(&info, &Arc::new(Config::default())).await;
    match result {
        Err(Error::ElementNotFound(tag)) => assert_eq!(tag, "Nope"),
        _ => panic!("Expected ElementNotFound"),
    }
}

#[tokio::test]
async fn test_defaults_build_recorder() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Arc::new(Config {
        recorder: RecorderConfig {
            out_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    });

    let registry = ElementRegistry::with_defaults();
    assert_eq!(registry.types(), vec![TYPE_RECORDER.to_string()]);

    let element = registry
        .resolve(&ElementInfo::new("pipe-9", TYPE_RECORDER), &config)
        .await?;
    assert!(element.subscribe().is_some());
    element.close().await;
    assert!(dir.path().join("pipe-9.ivf").exists());
    Ok(())
}

#[tokio::test]
async fn test_custom_type_receives_descriptor() -> anyhow::Result<()> {
    let mut registry = ElementRegistry::new();
    registry.register("Null", |info, _config| async move {
        assert_eq!(info.pipeline_id, "pipe-1");
        assert_eq!(info.element_type, "Null");
        Ok::<_, Error>(Arc::new(NullElement) as Arc<dyn Element>)
    });

    assert!(registry.contains("Null"));
    assert!(!registry.contains(TYPE_RECORDER));
    let element = registry
        .resolve(&ElementInfo::new("pipe-1", "Null"), &Arc::new(Config::default()))
        .await?;
    assert!(element.subscribe().is_none());
    Ok(())
}

#[tokio::test]
async fn test_constructor_failure_is_returned() {
    let mut registry = ElementRegistry::new();
    registry.register("Broken", |_info, _config| async move {
        Err::<Arc<dyn Element>, _>(Error::Closed)
    });

    let result = registry
        .resolve(&ElementInfo::new("pipe", "Broken"), &Arc::new(Config::default()))
        .await;
    assert!(matches!(result, Err(Error::Closed)));
}
