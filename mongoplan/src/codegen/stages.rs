use super::MqlCodeGenerator;
use crate::{
    task::{GeoNearStage, PipelineStage},
    workflow::{IdHandling, SortSpecification},
};
use bson::{doc, Bson};

impl MqlCodeGenerator {
    /// Every pipeline stage serializes to a one-key document whose key is
    /// the operator name.
    pub fn codegen_stage(&self, stage: &PipelineStage) -> bson::Document {
        match stage {
            PipelineStage::Match(sel) => doc! { "$match": sel.to_bson() },
            PipelineStage::Limit(n) => doc! { "$limit": *n },
            PipelineStage::Skip(n) => doc! { "$skip": *n },
            PipelineStage::Sort(specs) => doc! { "$sort": sort_doc(specs) },
            PipelineStage::Out(coll) => doc! { "$out": coll.collection.clone() },
            PipelineStage::Project(shape, id) => {
                let mut body = bson::Document::new();
                if *id == IdHandling::ExcludeId {
                    body.insert("_id", false);
                }
                body.extend(shape.to_bson());
                doc! { "$project": body }
            }
            PipelineStage::Redact(expr) => doc! { "$redact": expr.to_bson() },
            PipelineStage::Unwind(field) => doc! { "$unwind": field.render() },
            PipelineStage::Group(grouped, by) => {
                let mut body = grouped.to_bson();
                body.insert("_id", by.to_bson());
                doc! { "$group": body }
            }
            PipelineStage::GeoNear(geo) => doc! { "$geoNear": geo_near_doc(geo) },
        }
    }
}

pub(super) fn sort_doc(specs: &[SortSpecification]) -> bson::Document {
    specs
        .iter()
        .map(|spec| match spec {
            SortSpecification::Asc(f) => (f.to_string(), Bson::Int32(1)),
            SortSpecification::Desc(f) => (f.to_string(), Bson::Int32(-1)),
        })
        .collect()
}

/// `$geoNear` serializes every present optional field in a fixed order.
fn geo_near_doc(geo: &GeoNearStage) -> bson::Document {
    let mut out = doc! { "near": [geo.near.0, geo.near.1] };
    out.insert("distanceField", geo.distance_field.to_string());
    if let Some(limit) = geo.limit {
        out.insert("limit", limit);
    }
    if let Some(max_distance) = geo.max_distance {
        out.insert("maxDistance", max_distance);
    }
    if let Some(query) = &geo.query {
        out.insert("query", query.to_bson());
    }
    if let Some(spherical) = geo.spherical {
        out.insert("spherical", spherical);
    }
    if let Some(multiplier) = geo.distance_multiplier {
        out.insert("distanceMultiplier", multiplier);
    }
    if let Some(locs) = &geo.include_locs {
        out.insert("includeLocs", locs.to_string());
    }
    if let Some(unique) = geo.unique_docs {
        out.insert("uniqueDocs", unique);
    }
    out
}
