use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use common::{
    storage::types::{
        community_report::CommunityReport, entity::Entity, relationship::Relationship,
    },
    utils::config::SearchSettings,
};

use super::{
    claim_record, entity_record, relationship_record, report_record, text_unit_record,
    BuiltContext, ContextWriter, GraphView,
};
use crate::{
    engine::GraphQuery,
    scoring::{fuse_all, sort_by_fused_desc, FusionWeights, QueryTerms, Scored},
};

/// Lexical credit given to entities that belong to a boosted community.
pub(crate) const COMMUNITY_BOOST: f32 = 0.5;

/// Entities, their neighbourhood, community reports, sources and claims.
pub fn build_local_context(
    views: &[GraphView],
    query: &GraphQuery,
    settings: &SearchSettings,
) -> BuiltContext {
    let terms = QueryTerms::parse(&query.query);
    let mut writer = ContextWriter::new(views.len());
    for view in views {
        writer.begin_index(&view.name);
        write_local_sections(&mut writer, view, &terms, query, settings, &HashSet::new());
    }
    writer.finish(settings.max_context_tokens)
}

pub(crate) fn write_local_sections(
    writer: &mut ContextWriter,
    view: &GraphView,
    terms: &QueryTerms,
    query: &GraphQuery,
    settings: &SearchSettings,
    boosted: &HashSet<String>,
) {
    let entities = rank_entities(view, terms, boosted, query.result_limit);
    let ids: HashSet<&str> = entities.iter().map(|s| s.item.id.as_str()).collect();
    let titles: HashSet<&str> = entities.iter().map(|s| s.item.title.as_str()).collect();

    let reports = member_reports(view, &ids, i64::from(query.community_level), settings);
    writer.section(
        "reports",
        "Reports",
        &["id", "title", "content"],
        reports
            .into_iter()
            .map(|report| {
                let relevance = terms.overlap(&format!("{} {}", report.title, report.summary));
                report_record(&view.name, report, relevance)
            })
            .collect(),
    );

    writer.section(
        "entities",
        "Entities",
        &["id", "entity", "description", "number of relationships"],
        entities
            .iter()
            .map(|scored| entity_record(&view.name, &scored.item, scored.fused))
            .collect(),
    );

    writer.section(
        "claims",
        "Claims",
        &["id", "entity", "type", "status", "description"],
        view.covariates
            .iter()
            .filter(|claim| {
                titles.contains(claim.subject_id.as_str()) || ids.contains(claim.subject_id.as_str())
            })
            .take(settings.local_max_claims)
            .map(|claim| claim_record(&view.name, claim))
            .collect(),
    );

    let mut relationships: Vec<_> = view
        .relationships
        .iter()
        .filter(|relationship| {
            titles.contains(relationship.source.as_str())
                || titles.contains(relationship.target.as_str())
        })
        .collect();
    // In-network relationships first, then the heaviest ones.
    relationships.sort_by(|a, b| {
        let inside = |r: &&Relationship| {
            titles.contains(r.source.as_str()) && titles.contains(r.target.as_str())
        };
        inside(b)
            .cmp(&inside(a))
            .then_with(|| {
                b.weight_or_default()
                    .partial_cmp(&a.weight_or_default())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    relationships.truncate(settings.local_max_relationships);
    writer.section(
        "relationships",
        "Relationships",
        &["id", "source", "target", "description", "weight"],
        relationships
            .into_iter()
            .map(|relationship| relationship_record(&view.name, relationship))
            .collect(),
    );

    let units: HashMap<&str, _> = view
        .text_units
        .iter()
        .map(|unit| (unit.id.as_str(), unit))
        .collect();
    let mut seen = HashSet::new();
    writer.section(
        "sources",
        "Sources",
        &["id", "text"],
        entities
            .iter()
            .flat_map(|scored| scored.item.text_unit_ids.iter())
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| units.get(id.as_str()))
            .take(settings.local_max_text_units)
            .map(|unit| text_unit_record(&view.name, unit))
            .collect(),
    );
}

/// Top entities for the query. Falls back to the most connected entities
/// when no entity matches at all.
pub(crate) fn rank_entities(
    view: &GraphView,
    terms: &QueryTerms,
    boosted: &HashSet<String>,
    limit: usize,
) -> Vec<Scored<Entity>> {
    let mut scored: Vec<Scored<Entity>> = view
        .entities
        .iter()
        .map(|entity| {
            let mut lexical = terms.overlap(&format!("{} {}", entity.title, entity.description));
            if boosted.contains(&entity.id) {
                lexical = (lexical + COMMUNITY_BOOST).min(1.0);
            }
            Scored::new(entity.clone())
                .with_lexical_score(lexical)
                .with_centrality_score(entity.degree_or_zero() as f32)
        })
        .collect();

    fuse_all(&mut scored, FusionWeights::default());
    sort_by_fused_desc(&mut scored);

    if scored.iter().any(Scored::matched) {
        return scored
            .into_iter()
            .filter(Scored::matched)
            .take(limit)
            .collect();
    }

    scored.sort_by(|a, b| {
        b.item
            .degree_or_zero()
            .cmp(&a.item.degree_or_zero())
            .then_with(|| a.item.id.cmp(&b.item.id))
    });
    scored.truncate(limit);
    scored
}

/// Reports of communities holding selected entities, deepest level first.
fn member_reports<'a>(
    view: &'a GraphView,
    ids: &HashSet<&str>,
    max_level: i64,
    settings: &SearchSettings,
) -> Vec<&'a CommunityReport> {
    let mut reports: Vec<(&CommunityReport, usize)> = view
        .communities
        .iter()
        .filter(|community| community.level <= max_level)
        .filter_map(|community| {
            let members = community
                .entity_ids
                .iter()
                .filter(|id| ids.contains(id.as_str()))
                .count();
            (members > 0)
                .then(|| view.report_for(&community.community))
                .flatten()
                .map(|report| (report, members))
        })
        .collect();

    reports.sort_by(|(a, a_members), (b, b_members)| {
        b.level
            .cmp(&a.level)
            .then_with(|| b_members.cmp(a_members))
            .then_with(|| {
                b.rank_or_zero()
                    .partial_cmp(&a.rank_or_zero())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.community.cmp(&b.community))
    });

    reports
        .into_iter()
        .take(settings.local_max_reports)
        .map(|(report, _)| report)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::sample_index;
    use serde_json::Value;

    fn query(text: &str, community_level: u32, result_limit: usize) -> GraphQuery {
        GraphQuery {
            indexes: Vec::new(),
            community_level,
            response_type: "json".into(),
            query: text.into(),
            result_limit,
        }
    }

    fn ids(records: &Value, key: &str) -> Vec<String> {
        records[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn selects_matching_entities_from_the_dataset() {
        let (_dir, index) = sample_index(3, 50);
        let view = GraphView::from_index(&index).unwrap();
        let built = build_local_context(
            std::slice::from_ref(&view),
            &query("What is the main function of this project?", 1, 10),
            &SearchSettings::default(),
        );

        let entity_ids = ids(&built.records, "entities");
        assert_eq!(entity_ids.len(), 10);
        for id in &entity_ids {
            assert!(view.entities.iter().any(|e| &e.id == id), "{id} not in dataset");
        }
        assert!(entity_ids.contains(&"e-0".to_string()));
        assert!(!ids(&built.records, "relationships").is_empty());
        assert!(!ids(&built.records, "sources").is_empty());
        assert!(built.text.contains("-----Entities-----"));
    }

    #[test]
    fn reports_respect_community_level_and_go_deepest_first() {
        let (_dir, index) = sample_index(3, 50);
        let view = GraphView::from_index(&index).unwrap();

        let deep = build_local_context(
            std::slice::from_ref(&view),
            &query("main function project", 1, 10),
            &SearchSettings::default(),
        );
        let levels: Vec<i64> = deep.records["reports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["level"].as_i64().unwrap())
            .collect();
        assert_eq!(levels.first(), Some(&1));
        assert_eq!(levels.last(), Some(&0));

        let shallow = build_local_context(
            std::slice::from_ref(&view),
            &query("main function project", 0, 10),
            &SearchSettings::default(),
        );
        assert_eq!(ids(&shallow.records, "reports"), vec!["report-0"]);
    }

    #[test]
    fn unmatched_query_falls_back_to_connected_entities() {
        let (_dir, index) = sample_index(3, 20);
        let view = GraphView::from_index(&index).unwrap();
        let built = build_local_context(
            std::slice::from_ref(&view),
            &query("zebra xylophone", 1, 3),
            &SearchSettings::default(),
        );

        let entity_ids = ids(&built.records, "entities");
        assert_eq!(entity_ids.len(), 3);
        // Degrees cycle 1..=7, so the highest belong to e-6 and e-13.
        assert_eq!(entity_ids[0], "e-13");
        assert_eq!(entity_ids[1], "e-6");
    }

    #[test]
    fn boosted_entities_count_as_matches() {
        let (_dir, index) = sample_index(3, 20);
        let view = GraphView::from_index(&index).unwrap();
        let boosted: HashSet<String> = ["e-3".to_string()].into_iter().collect();

        let ranked = rank_entities(&view, &QueryTerms::parse("zebra"), &boosted, 5);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.id, "e-3");
    }
}
