//! # Template Injection
//!
//! Renders a [`ResourceSpecification`] against a [`TemplateContext`]: every
//! `{{ .FieldName }}` is replaced textually, the result is parsed as a Kubernetes object
//! and checked against the identity the catalogue declares for it. A template either
//! renders completely or not at all.

use crate::controller::reconciler::codec::TemplateContext;
use crate::manifests::{ManifestGroup, ResourceSpecification};
use crate::store::ResourceKind;
use kube::core::DynamicObject;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .expect("Failed to compile placeholder pattern - this should never happen")
});

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {template} references unknown field {field}")]
    UnresolvedPlaceholder { template: String, field: String },
    #[error("template {template} is not a valid resource: {source}")]
    Parse {
        template: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("template {template} is missing {field}")]
    MissingField {
        template: String,
        field: &'static str,
    },
    #[error("template {template} rendered {found}, expected {expected}")]
    IdentityMismatch {
        template: String,
        expected: String,
        found: String,
    },
}

/// A rendered object ready for the apply engine
#[derive(Debug, Clone)]
pub struct RenderedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub object: DynamicObject,
}

/// Replace every placeholder, failing on the first one the context cannot resolve
///
/// On failure the unresolved field name is returned.
pub fn substitute(template: &str, context: &dyn TemplateContext) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(field)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = context
            .lookup(field.as_str())
            .ok_or_else(|| field.as_str().to_string())?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Render one specification
pub fn render(
    spec: &ResourceSpecification,
    context: &dyn TemplateContext,
) -> Result<RenderedResource, RenderError> {
    let text = substitute(spec.template, context).map_err(|field| {
        RenderError::UnresolvedPlaceholder {
            template: spec.name.to_string(),
            field,
        }
    })?;

    let object: DynamicObject =
        serde_yaml::from_str(&text).map_err(|source| RenderError::Parse {
            template: spec.name.to_string(),
            source,
        })?;

    let types = object.types.as_ref().ok_or_else(|| RenderError::MissingField {
        template: spec.name.to_string(),
        field: "apiVersion/kind",
    })?;
    let kind = ResourceKind::new(&types.api_version, &types.kind);
    let name = object
        .metadata
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RenderError::MissingField {
            template: spec.name.to_string(),
            field: "metadata.name",
        })?;

    if kind.kind != spec.kind || name != spec.name {
        return Err(RenderError::IdentityMismatch {
            template: spec.name.to_string(),
            expected: format!("{} {}", spec.kind, spec.name),
            found: format!("{} {}", kind.kind, name),
        });
    }

    Ok(RenderedResource { kind, name, object })
}

/// Render a whole group in catalogue order
///
/// Any failure aborts the group before anything reaches the store.
pub fn render_all(
    group: &ManifestGroup,
    context: &dyn TemplateContext,
) -> Result<Vec<RenderedResource>, RenderError> {
    group
        .resources
        .iter()
        .map(|spec| render(spec, context))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::codec::StaticContext;
    use std::collections::HashMap;

    struct MapContext(HashMap<&'static str, &'static str>);

    impl TemplateContext for MapContext {
        fn lookup(&self, field: &str) -> Option<&str> {
            self.0.get(field).copied()
        }
    }

    const SECRET: ResourceSpecification = ResourceSpecification {
        kind: "Secret",
        name: "example",
        ordinal: 0,
        template: "apiVersion: v1\nkind: Secret\nmetadata:\n  name: example\ntype: Opaque\ndata:\n  token: '{{ .Token }}'\n  realm: '{{.Realm}}'\n",
    };

    fn context() -> MapContext {
        MapContext(HashMap::from([("Token", "dG9rZW4="), ("Realm", "UHJpbWFyeQ==")]))
    }

    #[test]
    fn test_substitute_with_and_without_spaces() {
        let text = substitute("a={{ .Token }} b={{.Realm}}", &context()).unwrap();
        assert_eq!(text, "a=dG9rZW4= b=UHJpbWFyeQ==");
    }

    #[test]
    fn test_substitute_reports_unknown_field() {
        assert_eq!(
            substitute("{{ .Token }} {{ .Missing }}", &context()).unwrap_err(),
            "Missing"
        );
    }

    #[test]
    fn test_render_parses_object() {
        let rendered = render(&SECRET, &context()).unwrap();
        assert_eq!(rendered.kind, ResourceKind::secret());
        assert_eq!(rendered.name, "example");
        assert_eq!(rendered.object.data["data"]["token"], "dG9rZW4=");
        assert_eq!(rendered.object.data["type"], "Opaque");
    }

    #[test]
    fn test_static_context_rejects_placeholders() {
        let err = render(&SECRET, &StaticContext).unwrap_err();
        assert!(matches!(err, RenderError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn test_render_rejects_identity_drift() {
        let spec = ResourceSpecification {
            name: "other",
            ..SECRET
        };
        let err = render(&spec, &context()).unwrap_err();
        assert!(matches!(err, RenderError::IdentityMismatch { .. }));
    }

    #[test]
    fn test_render_rejects_invalid_yaml() {
        let spec = ResourceSpecification {
            template: "apiVersion: v1\nkind: [unterminated\n",
            ..SECRET
        };
        assert!(matches!(
            render(&spec, &StaticContext),
            Err(RenderError::Parse { .. })
        ));
    }

    #[test]
    fn test_render_requires_name() {
        let spec = ResourceSpecification {
            template: "apiVersion: v1\nkind: Secret\nmetadata:\n  labels:\n    a: b\n",
            ..SECRET
        };
        assert!(matches!(
            render(&spec, &StaticContext),
            Err(RenderError::MissingField {
                field: "metadata.name",
                ..
            })
        ));
    }

    #[test]
    fn test_render_all_preserves_order() {
        let first = ResourceSpecification {
            kind: "ConfigMap",
            name: "first",
            ordinal: 0,
            template: "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: first\n",
        };
        let second = ResourceSpecification {
            kind: "ConfigMap",
            name: "second",
            ordinal: 1,
            template: "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n",
        };
        let resources: &'static [ResourceSpecification] = Box::leak(Box::new([second, first]));
        let group = ManifestGroup {
            name: "test",
            injection: crate::manifests::Injection::Static,
            resources,
        };
        let names: Vec<_> = render_all(&group, &StaticContext)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }
}
