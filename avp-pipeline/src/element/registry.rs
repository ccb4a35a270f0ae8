use std::{collections::HashMap, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

use crate::{
    config::Config,
    element::{Element, ElementInfo, recorder::Recorder},
    error::{Error, Result},
};

/// Container-file recorder.
pub const TYPE_RECORDER: &str = "Recorder";

pub type ElementConstructor = Arc<
    dyn Fn(ElementInfo, Arc<Config>) -> BoxFuture<'static, Result<Arc<dyn Element>>> + Send + Sync,
>;

/// Maps element type tags to constructors.
#[derive(Clone, Default)]
pub struct ElementRegistry {
    constructors: HashMap<String, ElementConstructor>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in element types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TYPE_RECORDER, |info, config| async move {
            let recorder = Recorder::create(&info.pipeline_id, &config.recorder).await?;
            let element: Arc<dyn Element> = Arc::new(recorder);
            Ok::<_, Error>(element)
        });
        registry
    }

    /// Register a constructor, replacing any previous one for the tag.
    pub fn register<F, Fut>(&mut self, element_type: &str, constructor: F)
    where
        F: Fn(ElementInfo, Arc<Config>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Element>>> + Send + 'static,
    {
        let boxed: ElementConstructor =
            Arc::new(move |info, config| constructor(info, config).boxed());
        self.constructors.insert(element_type.to_string(), boxed);
    }

    pub fn contains(&self, element_type: &str) -> bool {
        self.constructors.contains_key(element_type)
    }

    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build the element named by `info.element_type`.
    pub async fn resolve(
        &self,
        info: &ElementInfo,
        config: &Arc<Config>,
    ) -> Result<Arc<dyn Element>> {
        let constructor = self
            .constructors
            .get(&info.element_type)
            .ok_or_else(|| Error::ElementNotFound(info.element_type.clone()))?;
        constructor(info.clone(), Arc::clone(config)).await
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
