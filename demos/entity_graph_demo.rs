//! Demonstrates entity graph construction and dependency resolution
//!
//! Usage: `cargo run --example entity_graph_demo [path/to/entities.yaml]`
//!
//! Without a path, a built-in JSON configuration is used.

use ouroboros_invalidation::{
    build_graph, load_entity_config_file, load_entity_config_json, plan_operations, EntityAction,
    RelationKind,
};

const DEFAULT_ENTITIES: &str = r#"{
    "organization": { "invalidate": ["team"], "reset": ["billing"] },
    "team": { "invalidate": ["member", "project"] },
    "member": { "invalidate": ["team"] },
    "project": { "invalidate": ["task"], "reset": ["report"] },
    "task": { "invalidate": ["report"] }
}"#;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let entities = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading entities from {}...", path);
            load_entity_config_file(&path)?
        }
        None => load_entity_config_json(DEFAULT_ENTITIES)?,
    };

    let graph = build_graph(&entities);
    println!("✓ Built graph with {} entities\n", graph.len());

    // 1. Transitive dependencies
    println!("1. Dependencies per entity:");
    for entity in graph.entities() {
        println!("   {}", entity);
        for kind in [RelationKind::Invalidate, RelationKind::Reset] {
            let dependencies = graph.dependencies(entity, kind);
            if !dependencies.is_empty() {
                println!("     {:<10} -> {}", kind, dependencies.join(", "));
            }
        }
    }

    // 2. Diagnostics
    println!("\n2. Diagnostics:");
    for kind in [RelationKind::Invalidate, RelationKind::Reset] {
        for cycle in graph.cycles(kind) {
            println!("   {} cycle: {}", kind, cycle.join(" -> "));
        }
    }
    for entity in graph.unresolved_references() {
        println!("   referenced but not configured: {}", entity);
    }

    // 3. Planned cache operations
    println!("\n3. Operations for each entity mutation:");
    for entity in graph.entities() {
        println!("   invalidate {}", entity);
        for operation in plan_operations(&graph, &EntityAction::invalidate(entity)) {
            println!("     {}", operation);
        }
    }

    Ok(())
}
