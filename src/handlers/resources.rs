//! Built-in resource handlers.

use crate::error::ResourceError;
use crate::protocol::types::{Resource, ResourceContents, ResourceTemplate};
use crate::registry::{CapabilityRegistry, ResourceHandler};
use crate::session::RequestContext;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub const STATIC_RESOURCE_URI: &str = "test://static/resource";
pub const DYNAMIC_RESOURCE_TEMPLATE: &str = "test://dynamic/resource/{id}";
pub const GENERATED_RESOURCE_COUNT: u64 = 100;

/// Generated resources alternate between text and binary payloads,
/// starting with text for resource 1.
pub fn resource_is_text(n: u64) -> bool {
    n % 2 == 1
}

/// Fixed sample resource.
pub struct StaticResource;

#[async_trait]
impl ResourceHandler for StaticResource {
    async fn read(
        &self,
        _ctx: &RequestContext,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, ResourceError> {
        Ok(vec![ResourceContents::text(
            uri,
            "text/plain",
            "This is a sample resource",
        )])
    }
}

/// Backs the `test://dynamic/resource/{id}` template.
pub struct DynamicResource;

#[async_trait]
impl ResourceHandler for DynamicResource {
    async fn read(
        &self,
        ctx: &RequestContext,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, ResourceError> {
        let id = ctx
            .template_param("id")
            .ok_or_else(|| ResourceError::InvalidUri(uri.to_string()))?;
        Ok(vec![ResourceContents::text(
            uri,
            "text/plain",
            format!("Dynamic resource {}: This is a sample resource", id),
        )])
    }
}

/// Serves the 100 generated `test://static/resource/{n}` entries.
pub struct GeneratedResource;

impl GeneratedResource {
    fn parse_number(uri: &str) -> Option<u64> {
        let n: u64 = uri.rsplit('/').next()?.parse().ok()?;
        (1..=GENERATED_RESOURCE_COUNT).contains(&n).then_some(n)
    }
}

#[async_trait]
impl ResourceHandler for GeneratedResource {
    async fn read(
        &self,
        _ctx: &RequestContext,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, ResourceError> {
        let n = Self::parse_number(uri).ok_or_else(|| ResourceError::InvalidUri(uri.to_string()))?;
        let contents = if resource_is_text(n) {
            ResourceContents::text(
                uri,
                "text/plain",
                format!("Text content for resource {}", n),
            )
        } else {
            ResourceContents::blob(
                uri,
                "application/octet-stream",
                BASE64.encode(format!("Binary content for resource {}", n)),
            )
        };
        Ok(vec![contents])
    }
}

/// Register the static resource, the dynamic template and the generated set.
pub fn register_resources(registry: &mut CapabilityRegistry) -> crate::error::RegistryResult<()> {
    registry.register_resource(
        Resource {
            uri: STATIC_RESOURCE_URI.into(),
            name: "Static Resource".into(),
            description: Some("A static resource with a fixed URI".into()),
            mime_type: Some("text/plain".into()),
        },
        std::sync::Arc::new(StaticResource),
    )?;

    registry.register_template(
        ResourceTemplate {
            uri_template: DYNAMIC_RESOURCE_TEMPLATE.into(),
            name: "Dynamic Resource".into(),
            description: Some("A dynamic resource with a parameterized URI".into()),
            mime_type: Some("text/plain".into()),
        },
        std::sync::Arc::new(DynamicResource),
    );

    let generated = std::sync::Arc::new(GeneratedResource);
    for n in 1..=GENERATED_RESOURCE_COUNT {
        let mime = if resource_is_text(n) {
            "text/plain"
        } else {
            "application/octet-stream"
        };
        registry.register_resource(
            Resource {
                uri: format!("test://static/resource/{}", n),
                name: format!("Resource {}", n),
                description: None,
                mime_type: Some(mime.into()),
            },
            generated.clone(),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_static_resource() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let contents = StaticResource
            .read(&ctx, STATIC_RESOURCE_URI)
            .await
            .unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("This is a sample resource"));
        assert_eq!(contents[0].mime_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_dynamic_resource_uses_extracted_id() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session)
            .with_template_params(HashMap::from([("id".to_string(), "42".to_string())]));
        let contents = DynamicResource
            .read(&ctx, "test://dynamic/resource/42")
            .await
            .unwrap();
        assert_eq!(contents[0].uri, "test://dynamic/resource/42");
        assert!(contents[0].text.as_deref().unwrap().contains("42"));
    }

    #[tokio::test]
    async fn test_generated_resource_alternates_text_and_blob() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);

        let first = GeneratedResource
            .read(&ctx, "test://static/resource/1")
            .await
            .unwrap();
        assert_eq!(
            first[0].text.as_deref(),
            Some("Text content for resource 1")
        );
        assert!(first[0].blob.is_none());

        let second = GeneratedResource
            .read(&ctx, "test://static/resource/2")
            .await
            .unwrap();
        assert!(second[0].text.is_none());
        let decoded = BASE64.decode(second[0].blob.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, b"Binary content for resource 2");
    }

    #[tokio::test]
    async fn test_generated_resource_rejects_out_of_range() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let err = GeneratedResource
            .read(&ctx, "test://static/resource/101")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidUri(_)));
    }

    #[test]
    fn test_register_resources_lists_everything() {
        let mut registry = CapabilityRegistry::default();
        register_resources(&mut registry).unwrap();

        let resources: Vec<_> = registry.list_resources().collect();
        assert_eq!(resources.len(), 1 + GENERATED_RESOURCE_COUNT as usize);
        assert_eq!(resources[0].uri, STATIC_RESOURCE_URI);
        assert_eq!(resources[1].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(
            resources[2].mime_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(registry.list_templates().count(), 1);
    }
}
