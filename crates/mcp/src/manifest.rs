// Manifest-driven descriptor source: namespaces, methods and their HTTP bindings

use crate::http::{http_client, HttpMethod, HttpOperation};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use toolbridge_core::auth::{AuthManager, TokenProvider};
use toolbridge_core::descriptor::{
    DescriptorSource, DiscoveredMethod, MethodDescriptor, Operation, Parameter,
};
use url::Url;

/// Top-level manifest file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub namespaces: Vec<NamespaceManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceManifest {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: Option<AuthManifest>,
    #[serde(default)]
    pub methods: Vec<MethodManifest>,
}

/// Token read from the environment and sent in a header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthManifest {
    pub env: String,
    #[serde(default = "default_auth_header")]
    pub header: String,
    #[serde(default)]
    pub scheme: Option<String>,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodManifest {
    /// Name within the namespace; the tool is named `<namespace>.<name>`
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "unsafe")]
    pub unsafe_hint: Option<bool>,
    pub http: HttpBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBinding {
    #[serde(default)]
    pub method: HttpMethod,
    pub path: String,
}

impl Manifest {
    /// Load a manifest; `.json` files are JSON, anything else TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.iter().map(|ns| ns.name.clone()).collect()
    }

    /// Token providers for every namespace that declares auth
    pub fn auth_manager(&self) -> AuthManager {
        let mut manager = AuthManager::new();
        for namespace in &self.namespaces {
            if let Some(auth) = &namespace.auth {
                let mut provider = TokenProvider::from_env(&namespace.name, &auth.env);
                if let Some(scheme) = &auth.scheme {
                    provider = provider.with_scheme(scheme);
                }
                manager = manager.with_provider(provider);
            }
        }
        manager
    }
}

/// Descriptor source over a parsed manifest
pub struct ManifestSource {
    namespaces: HashMap<String, std::result::Result<Vec<DiscoveredMethod>, String>>,
}

impl ManifestSource {
    pub fn new(manifest: &Manifest) -> Result<Self> {
        let client = http_client().context("Failed to create HTTP client")?;

        let namespaces = manifest
            .namespaces
            .iter()
            .map(|namespace| {
                let methods = bind_namespace(&client, namespace).map_err(|e| format!("{:#}", e));
                (namespace.name.clone(), methods)
            })
            .collect();

        Ok(Self { namespaces })
    }
}

fn bind_namespace(client: &reqwest::Client, namespace: &NamespaceManifest) -> Result<Vec<DiscoveredMethod>> {
    let base_url = Url::parse(&namespace.base_url)
        .with_context(|| format!("invalid base_url {:?}", namespace.base_url))?;
    let auth_header = namespace
        .auth
        .as_ref()
        .map(|auth| auth.header.clone())
        .unwrap_or_else(default_auth_header);

    Ok(namespace
        .methods
        .iter()
        .map(|method| {
            let mut descriptor =
                MethodDescriptor::new(format!("{}.{}", namespace.name, method.name));
            descriptor.parameters = method.parameters.clone();
            descriptor.documentation = method.description.clone();
            descriptor.unsafe_hint = method.unsafe_hint;

            let operation = HttpOperation::new(
                client.clone(),
                method.http.method,
                base_url.clone(),
                method.http.path.clone(),
            )
            .with_auth_header(auth_header.clone());

            DiscoveredMethod::new(descriptor, Operation::awaited(operation))
        })
        .collect())
}

impl DescriptorSource for ManifestSource {
    fn list_descriptors(&self, namespace: &str) -> Result<Vec<DiscoveredMethod>> {
        match self.namespaces.get(namespace) {
            Some(Ok(methods)) => Ok(methods.clone()),
            Some(Err(e)) => Err(anyhow::anyhow!("namespace {} is misconfigured: {}", namespace, e)),
            None => Err(anyhow::anyhow!("namespace not declared in manifest: {}", namespace)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use toolbridge_core::auth::CredentialInjector;
    use toolbridge_core::descriptor::{AsyncOperation, ParameterKind};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST: &str = r#"
[[namespaces]]
name = "github"
base_url = "https://api.github.com"
auth = { env = "TOOLBRIDGE_TEST_GITHUB_TOKEN_UNSET", scheme = "Bearer" }

[[namespaces.methods]]
name = "repos.list_commits"
description = ":param owner: repository owner"
http = { method = "GET", path = "/repos/{owner}/{repo}/commits" }
parameters = [
    { name = "owner", type = "str" },
    { name = "repo", type = "str" },
    { name = "per_page", type = "int", default = 30 },
]

[[namespaces.methods]]
name = "issues.close"
unsafe = true
http = { method = "PATCH", path = "/repos/{owner}/{repo}/issues/{number}" }
parameters = [{ name = "number", type = "int", kind = "keyword" }]

[[namespaces]]
name = "broken"
base_url = "not a url"
"#;

    #[test]
    fn test_parse_toml_manifest() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(manifest.namespace_names(), vec!["github", "broken"]);

        let github = &manifest.namespaces[0];
        assert_eq!(github.auth.as_ref().unwrap().header, "Authorization");
        assert_eq!(github.methods[0].http.method, HttpMethod::Get);
        assert_eq!(github.methods[1].unsafe_hint, Some(true));
        assert_eq!(github.methods[1].parameters[0].kind, ParameterKind::Keyword);
        assert!(github.methods[0].parameters[2].has_default());
    }

    #[test]
    fn test_source_lists_bound_methods() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let source = ManifestSource::new(&manifest).unwrap();

        let methods = source.list_descriptors("github").unwrap();
        let names: Vec<&str> = methods.iter().map(|m| m.descriptor.name.as_str()).collect();
        assert_eq!(names, vec!["github.repos.list_commits", "github.issues.close"]);
        assert_eq!(methods[0].operation.kind(), "awaited");
        assert_eq!(methods[1].descriptor.unsafe_hint, Some(true));

        let broken = source.list_descriptors("broken").unwrap_err();
        assert!(broken.to_string().contains("misconfigured"));
        assert!(source.list_descriptors("k8s").is_err());
    }

    #[test]
    fn test_auth_manager_from_manifest() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let auth = manifest.auth_manager();
        // The variable is never set, so injection leaves arguments untouched
        assert!(!auth.has_credentials("github"));
        assert_eq!(auth.inject("github", json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn test_load_json_manifest() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            "{}",
            json!({
                "namespaces": [{
                    "name": "status",
                    "base_url": "http://localhost:8080",
                    "methods": [{"name": "get", "http": {"path": "/status"}}]
                }]
            })
        )
        .unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.namespaces[0].methods[0].http.method, HttpMethod::Get);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[[namespaces]]\nname = 3").unwrap();
        let err = Manifest::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse manifest"));
    }

    #[tokio::test]
    async fn test_bound_operation_calls_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/pods/web-1"))
            .and(header("x-token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"phase": "Running"})))
            .mount(&server)
            .await;

        let manifest = Manifest::from_json_str(
            &json!({
                "namespaces": [{
                    "name": "k8s",
                    "base_url": format!("{}/v1", server.uri()),
                    "auth": {"env": "UNUSED", "header": "X-Token"},
                    "methods": [{
                        "name": "read_pod",
                        "parameters": [{"name": "pod"}],
                        "http": {"method": "GET", "path": "/pods/{pod}"}
                    }]
                }]
            })
            .to_string(),
        )
        .unwrap();

        let source = ManifestSource::new(&manifest).unwrap();
        let methods = source.list_descriptors("k8s").unwrap();
        let Operation::Awaited(op) = &methods[0].operation else {
            panic!("expected an awaited operation");
        };
        let result = op
            .call(json!({"pod": "web-1", "__auth_token": "abc"}))
            .await
            .unwrap();
        assert_eq!(result["phase"], "Running");
    }
}
