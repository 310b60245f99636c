//! Product relationship graph and outlet registry.
//!
//! An undirected graph over product ids. Each unordered pair holds at most
//! one weight per [`RelationshipKind`]; links are stored on both endpoints so
//! neighbor lookups never scan the whole graph. Outlets keep a materialized
//! product -> outlet inverse that is updated together with the registry.

use crate::bundle::{Material, ObjectType};
use crate::error::{Error, Result};
use crate::product::ProductId;
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    SameMaterial,
    SameType,
    SimilarTo,
}

impl RelationshipKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::SameMaterial => "SAME_MATERIAL",
            RelationshipKind::SameType => "SAME_TYPE",
            RelationshipKind::SimilarTo => "SIMILAR_TO",
        }
    }

    /// Kinds produced by the batch build from predicted attributes.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        !matches!(self, RelationshipKind::SimilarTo)
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SAME_MATERIAL" => Ok(RelationshipKind::SameMaterial),
            "SAME_TYPE" => Ok(RelationshipKind::SameType),
            "SIMILAR_TO" => Ok(RelationshipKind::SimilarTo),
            other => Err(format!("unknown relationship kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub material: Option<Material>,
    pub object_type: Option<ObjectType>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlet {
    pub outlet_id: String,
    pub name: String,
    pub location: String,
    /// (latitude, longitude)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
    #[serde(default)]
    pub products: Vec<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedProduct {
    pub product_id: ProductId,
    pub relationship: RelationshipKind,
    pub weight: f32,
    pub material: Option<Material>,
    pub object_type: Option<ObjectType>,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_products: usize,
    /// Connected pairs, whatever the number of kinds on each.
    pub total_relationships: usize,
    pub total_outlets: usize,
    pub products_with_outlets: usize,
}

/// Weights assigned by [`RelationshipGraph::build_relationships`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub same_material_weight: f32,
    pub same_type_weight: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            same_material_weight: 0.8,
            same_type_weight: 0.7,
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<()> {
        for weight in [self.same_material_weight, self.same_type_weight] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::InvalidConfig(format!(
                    "graph relationship weight {} outside [0, 1]",
                    weight
                )));
            }
        }
        Ok(())
    }
}

type Links = SmallVec<[(RelationshipKind, f32); 3]>;

/// One stored edge, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub a: ProductId,
    pub b: ProductId,
    pub kind: RelationshipKind,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: ProductId,
    pub attributes: NodeAttributes,
}

/// Serializable form of the whole graph. The product -> outlet inverse is
/// not stored; it is rebuilt from the outlet records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<RelationshipEdge>,
    pub outlets: Vec<Outlet>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    nodes: AHashMap<ProductId, NodeAttributes>,
    adjacency: AHashMap<ProductId, AHashMap<ProductId, Links>>,
    outlets: BTreeMap<String, Outlet>,
    product_outlets: AHashMap<ProductId, BTreeSet<String>>,
}

impl RelationshipGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node or refresh its attributes. Returns true for a new node.
    pub fn add_product(&mut self, id: ProductId, attributes: NodeAttributes) -> bool {
        self.nodes.insert(id, attributes).is_none()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn node(&self, id: &ProductId) -> Option<&NodeAttributes> {
        self.nodes.get(id)
    }

    /// Add or overwrite the `kind` link between two existing products.
    pub fn add_relationship(
        &mut self,
        a: &ProductId,
        b: &ProductId,
        kind: RelationshipKind,
        weight: f32,
    ) -> Result<()> {
        if a == b {
            return Err(Error::SelfLoop(a.to_string()));
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(Error::InvalidWeight(weight));
        }
        for id in [a, b] {
            if !self.nodes.contains_key(id) {
                return Err(Error::ProductNotFound(id.to_string()));
            }
        }

        self.link(a, b, kind, weight);
        self.link(b, a, kind, weight);
        Ok(())
    }

    fn link(&mut self, from: &ProductId, to: &ProductId, kind: RelationshipKind, weight: f32) {
        let links = self
            .adjacency
            .entry(from.clone())
            .or_default()
            .entry(to.clone())
            .or_default();
        match links.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = weight,
            None => links.push((kind, weight)),
        }
    }

    /// Every kind linking `a` and `b`, in kind order.
    #[must_use]
    pub fn relationships_between(&self, a: &ProductId, b: &ProductId) -> Vec<(RelationshipKind, f32)> {
        let mut links: Vec<(RelationshipKind, f32)> = self
            .adjacency
            .get(a)
            .and_then(|neighbors| neighbors.get(b))
            .map(|links| links.to_vec())
            .unwrap_or_default();
        links.sort_by_key(|(kind, _)| *kind);
        links
    }

    /// Direct neighbors of `id`, strongest first. Each neighbor appears once,
    /// reported with its strongest kind. Unknown ids yield an empty list.
    #[must_use]
    pub fn get_related(&self, id: &ProductId, max_results: usize) -> Vec<RelatedProduct> {
        let Some(neighbors) = self.adjacency.get(id) else {
            return Vec::new();
        };

        let mut related: Vec<RelatedProduct> = neighbors
            .iter()
            .filter_map(|(neighbor, links)| {
                let (kind, weight) = links.iter().copied().max_by(|x, y| {
                    OrderedFloat(x.1)
                        .cmp(&OrderedFloat(y.1))
                        .then_with(|| y.0.cmp(&x.0))
                })?;
                let attributes = self.nodes.get(neighbor).cloned().unwrap_or_default();
                Some(RelatedProduct {
                    product_id: neighbor.clone(),
                    relationship: kind,
                    weight,
                    material: attributes.material,
                    object_type: attributes.object_type,
                    title: attributes.title,
                })
            })
            .collect();

        related.sort_by(|x, y| {
            OrderedFloat(y.weight)
                .cmp(&OrderedFloat(x.weight))
                .then_with(|| x.product_id.cmp(&y.product_id))
        });
        related.truncate(max_results);
        related
    }

    /// Batch build: register every product, drop previously derived links and
    /// connect every pair sharing a predicted material or object type.
    /// Quadratic in the number of products. Returns the links created.
    pub fn build_relationships<I>(&mut self, products: I, config: &GraphConfig) -> usize
    where
        I: IntoIterator<Item = (ProductId, NodeAttributes)>,
    {
        for (id, attributes) in products {
            self.nodes.insert(id, attributes);
        }

        for neighbors in self.adjacency.values_mut() {
            for links in neighbors.values_mut() {
                links.retain(|(kind, _)| !kind.is_derived());
            }
            neighbors.retain(|_, links| !links.is_empty());
        }
        self.adjacency.retain(|_, neighbors| !neighbors.is_empty());

        let mut ids: Vec<ProductId> = self.nodes.keys().cloned().collect();
        ids.sort();

        let mut created = 0;
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let (left, right) = (&self.nodes[a], &self.nodes[b]);
                let same_material = matches!((left.material, right.material), (Some(x), Some(y)) if x == y);
                let same_type = matches!((left.object_type, right.object_type), (Some(x), Some(y)) if x == y);

                if same_material {
                    self.link(a, b, RelationshipKind::SameMaterial, config.same_material_weight);
                    self.link(b, a, RelationshipKind::SameMaterial, config.same_material_weight);
                    created += 1;
                }
                if same_type {
                    self.link(a, b, RelationshipKind::SameType, config.same_type_weight);
                    self.link(b, a, RelationshipKind::SameType, config.same_type_weight);
                    created += 1;
                }
            }
        }
        created
    }

    /// Register or replace an outlet. The inverse index drops the outlet from
    /// products it no longer carries. Returns the replaced record.
    pub fn add_outlet(&mut self, mut outlet: Outlet) -> Option<Outlet> {
        let mut seen = BTreeSet::new();
        outlet.products.retain(|p| seen.insert(p.clone()));

        let previous = self.outlets.remove(&outlet.outlet_id);
        if let Some(old) = &previous {
            for product in &old.products {
                if let Some(ids) = self.product_outlets.get_mut(product) {
                    ids.remove(&old.outlet_id);
                    if ids.is_empty() {
                        self.product_outlets.remove(product);
                    }
                }
            }
        }

        for product in &outlet.products {
            self.product_outlets
                .entry(product.clone())
                .or_default()
                .insert(outlet.outlet_id.clone());
        }
        self.outlets.insert(outlet.outlet_id.clone(), outlet);
        previous
    }

    /// Outlets carrying `id`, ordered by outlet id.
    #[must_use]
    pub fn outlets_for(&self, id: &ProductId) -> Vec<Outlet> {
        self.product_outlets
            .get(id)
            .map(|ids| ids.iter().filter_map(|oid| self.outlets.get(oid).cloned()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn outlets_for_products(&self, ids: &[ProductId]) -> BTreeMap<ProductId, Vec<Outlet>> {
        ids.iter().map(|id| (id.clone(), self.outlets_for(id))).collect()
    }

    #[must_use]
    pub fn outlet(&self, outlet_id: &str) -> Option<&Outlet> {
        self.outlets.get(outlet_id)
    }

    #[must_use]
    pub fn statistics(&self) -> GraphStats {
        let directed: usize = self.adjacency.values().map(|n| n.len()).sum();
        GraphStats {
            total_products: self.nodes.len(),
            total_relationships: directed / 2,
            total_outlets: self.outlets.len(),
            products_with_outlets: self.product_outlets.len(),
        }
    }

    /// Deterministic serializable form: nodes and edges sorted by id.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<GraphNode> = self
            .nodes
            .iter()
            .map(|(id, attributes)| GraphNode {
                id: id.clone(),
                attributes: attributes.clone(),
            })
            .collect();
        nodes.sort_by(|x, y| x.id.cmp(&y.id));

        let mut edges = Vec::new();
        for (a, neighbors) in &self.adjacency {
            for (b, links) in neighbors {
                if a < b {
                    for (kind, weight) in links {
                        edges.push(RelationshipEdge {
                            a: a.clone(),
                            b: b.clone(),
                            kind: *kind,
                            weight: *weight,
                        });
                    }
                }
            }
        }
        edges.sort_by(|x, y| (&x.a, &x.b, x.kind).cmp(&(&y.a, &y.b, y.kind)));

        GraphSnapshot {
            nodes,
            edges,
            outlets: self.outlets.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.add_product(node.id, node.attributes);
        }
        for edge in snapshot.edges {
            graph.add_relationship(&edge.a, &edge.b, edge.kind, edge.weight)?;
        }
        for outlet in snapshot.outlets {
            graph.add_outlet(outlet);
        }
        Ok(graph)
    }
}
