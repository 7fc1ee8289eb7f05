//! Plugin dependency resolution.
//!
//! Depth-first traversal with three-colour marking (unvisited / on the
//! current path / done), driven by an explicit stack of frames so very
//! deep dependency chains cannot overflow the call stack. Independent
//! plugins keep their input order.

use std::collections::HashMap;
use std::iter;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};

/// An optional dependency that was absent and therefore skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDependency {
    /// The plugin that declared the dependency.
    pub plugin: String,
    /// The missing dependency.
    pub dependency: String,
}

/// Output of [`resolve_load_order`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Initialization order: every plugin after all of its present dependencies.
    pub order: Vec<String>,
    /// Optional dependencies that were not registered.
    pub skipped: Vec<SkippedDependency>,
}

impl Resolution {
    /// Finalization order, the exact reverse of [`Resolution::order`].
    pub fn finalize_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// One level of the traversal: a plugin and the next dependency to look at.
struct Frame {
    node: usize,
    next: usize,
}

/// Orders plugins so that dependencies come before dependents.
///
/// # Errors
/// - [`PluginError::DuplicateName`] if two descriptors share a name.
/// - [`PluginError::MissingDependency`] if a required dependency is absent.
/// - [`PluginError::CircularDependency`] with the path that closes the cycle,
///   e.g. `a -> b -> a`.
pub fn resolve_load_order<'a, I>(plugins: I) -> PluginResult<Resolution>
where
    I: IntoIterator<Item = &'a PluginDescriptor>,
{
    let nodes: Vec<&PluginDescriptor> = plugins.into_iter().collect();

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.name(), i).is_some() {
            return Err(PluginError::DuplicateName {
                name: node.name().to_string(),
            });
        }
    }

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut resolution = Resolution {
        order: Vec::with_capacity(nodes.len()),
        skipped: Vec::new(),
    };

    for root in 0..nodes.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        marks[root] = Mark::OnPath;
        let mut stack = vec![Frame { node: root, next: 0 }];

        while let Some(frame) = stack.last_mut() {
            let plugin = nodes[frame.node];

            let Some(dep) = plugin.dependencies().get(frame.next) else {
                let done = frame.node;
                stack.pop();
                marks[done] = Mark::Done;
                resolution.order.push(plugin.name().to_string());
                continue;
            };
            frame.next += 1;

            match index.get(dep.name.as_str()) {
                None if dep.optional => {
                    warn!(
                        plugin = %plugin.name(),
                        dependency = %dep.name,
                        "Optional dependency not registered, skipping"
                    );
                    resolution.skipped.push(SkippedDependency {
                        plugin: plugin.name().to_string(),
                        dependency: dep.name.clone(),
                    });
                }
                None => {
                    return Err(PluginError::MissingDependency {
                        plugin: plugin.name().to_string(),
                        dependency: dep.name.clone(),
                    });
                }
                Some(&target) => match marks[target] {
                    Mark::Done => {}
                    Mark::OnPath => {
                        let path = stack
                            .iter()
                            .map(|f| nodes[f.node].name().to_string())
                            .chain(iter::once(dep.name.clone()))
                            .collect();
                        return Err(PluginError::CircularDependency { path });
                    }
                    Mark::Unvisited => {
                        marks[target] = Mark::OnPath;
                        stack.push(Frame {
                            node: target,
                            next: 0,
                        });
                    }
                },
            }
        }
    }

    debug!(order = ?resolution.order, "Resolved plugin load order");
    Ok(resolution)
}
