//! Console formatting for catalogs and call results

use toolgate_application::{DispatchOutput, ToolCatalog};
use toolgate_domain::ToolDescriptor;

/// One line per tool: `name(required, optional?)  description`, plus a
/// trailer naming duplicate tool names.
pub fn format_catalog(catalog: &ToolCatalog) -> String {
    if catalog.is_empty() {
        return "No tools available.".to_string();
    }

    let mut lines: Vec<String> = catalog.tools.iter().map(|tool| format_tool(catalog, tool)).collect();

    let duplicates = catalog.duplicate_names();
    if !duplicates.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Duplicate tool names (last provider wins): {}",
            duplicates.join(", ")
        ));
    }
    lines.join("\n")
}

fn format_tool(catalog: &ToolCatalog, tool: &ToolDescriptor) -> String {
    let params = tool
        .parameter_schema
        .as_ref()
        .map(|schema| {
            schema
                .properties
                .keys()
                .map(|name| {
                    if schema.is_required(name) {
                        name.clone()
                    } else {
                        format!("{}?", name)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let source = match catalog.client_for(&tool.name) {
        Some(client) => client.provider_id().to_string(),
        None if catalog.is_marketplace_tool(&tool.name) => "marketplace".to_string(),
        None => "-".to_string(),
    };

    match &tool.description {
        Some(description) => format!("{}({})  [{}]  {}", tool.name, params, source, description),
        None => format!("{}({})  [{}]", tool.name, params, source),
    }
}

pub fn format_dispatch(output: &DispatchOutput) -> String {
    match output {
        DispatchOutput::Denied { message, .. } => format!("Denied: {}", message),
        DispatchOutput::Completed { outcome, .. } if outcome.is_error => {
            format!("Error: {}", outcome.text())
        }
        DispatchOutput::Completed { outcome, .. } => {
            let text = outcome.text();
            if text.is_empty() {
                serde_json::to_string_pretty(&outcome.content).unwrap_or_default()
            } else {
                text
            }
        }
    }
}
