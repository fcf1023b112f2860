// Tool catalog: built once from a descriptor source, read-only afterwards

use crate::auth::{CredentialInjector, NoCredentials};
use crate::config::{ConfigError, ServerConfig};
use crate::descriptor::{DescriptorSource, MethodDescriptor, Operation};
use crate::filter::ToolFilter;
use crate::pagination::{detect_pagination, PaginationInfo};
use crate::safety::{LexicalSafetyPolicy, SafetyPolicy};
use crate::schema::{build_schema, enhance_or_keep, InputSchema, SchemaEnhancer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub is_dangerous: bool,
    pub has_pagination: bool,
    #[serde(default)]
    pub pagination: PaginationInfo,
    pub has_auth: bool,
    pub namespace: String,
}

/// A named, schema-described, invokable operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub metadata: ToolMetadata,
}

/// Insertion-ordered registry of tools and their operations
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
    operations: Vec<Operation>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool; the first tool registered under a name wins
    fn insert(&mut self, tool: Tool, operation: Operation) -> bool {
        if self.index.contains_key(&tool.name) {
            return false;
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        self.operations.push(operation);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    /// Tool and operation together
    pub fn entry(&self, name: &str) -> Option<(&Tool, &Operation)> {
        self.index
            .get(name)
            .map(|&i| (&self.tools[i], &self.operations[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tools in insertion order
    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Distinct namespaces with at least one tool, in first-seen order
    pub fn namespaces(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tool in &self.tools {
            if !seen.contains(&tool.metadata.namespace) {
                seen.push(tool.metadata.namespace.clone());
            }
        }
        seen
    }
}

/// Assembles a catalog from a descriptor source
pub struct CatalogBuilder {
    safety: Arc<dyn SafetyPolicy>,
    filter: ToolFilter,
    allow_dangerous: bool,
    enhancer: Option<Arc<dyn SchemaEnhancer>>,
    credentials: Arc<dyn CredentialInjector>,
    max_tools: Option<usize>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self {
            safety: Arc::new(LexicalSafetyPolicy),
            filter: ToolFilter::allow_all(),
            allow_dangerous: false,
            enhancer: None,
            credentials: Arc::new(NoCredentials),
            max_tools: None,
        }
    }

    /// Builder preconfigured with the filter, safety and cap settings of `config`
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new()
            .with_filter(config.tool_filter()?)
            .allow_dangerous(config.allow_dangerous)
            .max_tools(config.max_tools))
    }

    pub fn with_safety_policy(mut self, policy: Arc<dyn SafetyPolicy>) -> Self {
        self.safety = policy;
        self
    }

    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn allow_dangerous(mut self, allow: bool) -> Self {
        self.allow_dangerous = allow;
        self
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn SchemaEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialInjector>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn max_tools(mut self, max_tools: Option<usize>) -> Self {
        self.max_tools = max_tools;
        self
    }

    /// Load every namespace; failures skip only the failing namespace
    pub async fn build(&self, source: &dyn DescriptorSource, namespaces: &[String]) -> ToolCatalog {
        let mut catalog = ToolCatalog::new();

        'namespaces: for namespace in namespaces {
            let methods = match source.list_descriptors(namespace) {
                Ok(methods) => methods,
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Failed to load namespace");
                    continue;
                }
            };

            let has_auth = self.credentials.has_credentials(namespace);
            if !has_auth {
                warn!(namespace = %namespace, "No credentials configured for namespace");
            }

            let mut loaded = 0usize;
            for method in methods {
                if self.max_tools.is_some_and(|max| catalog.len() >= max) {
                    info!(max_tools = catalog.len(), "Tool limit reached, skipping remaining tools");
                    break 'namespaces;
                }

                let descriptor = method.descriptor;
                let is_dangerous = self.safety.classify(&descriptor);
                if is_dangerous && !self.allow_dangerous {
                    debug!(tool = %descriptor.name, "Skipping dangerous tool");
                    continue;
                }
                if !self.filter.should_include(&descriptor.name) {
                    debug!(tool = %descriptor.name, "Tool excluded by filter");
                    continue;
                }
                if catalog.contains(&descriptor.name) {
                    warn!(tool = %descriptor.name, "Duplicate tool name, keeping the first");
                    continue;
                }

                let tool = self
                    .build_tool(&descriptor, namespace, is_dangerous, has_auth)
                    .await;
                if catalog.insert(tool, method.operation) {
                    loaded += 1;
                }
            }

            info!(namespace = %namespace, tools = loaded, "Loaded namespace");
        }

        info!(
            tools = catalog.len(),
            namespaces = namespaces.len(),
            "Tool catalog built"
        );
        catalog
    }

    async fn build_tool(
        &self,
        descriptor: &MethodDescriptor,
        namespace: &str,
        is_dangerous: bool,
        has_auth: bool,
    ) -> Tool {
        let pagination = detect_pagination(descriptor.parameter_names());
        let schema = enhance_or_keep(
            self.enhancer.as_deref(),
            build_schema(descriptor),
            descriptor.documentation.as_deref(),
        )
        .await;

        Tool {
            name: descriptor.name.clone(),
            description: descriptor.documentation.clone().unwrap_or_default(),
            input_schema: schema,
            metadata: ToolMetadata {
                is_dangerous,
                has_pagination: pagination.is_paginated(),
                pagination,
                has_auth,
                namespace: namespace.to_string(),
            },
        }
    }
}
