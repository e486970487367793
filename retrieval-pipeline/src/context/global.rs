use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap, VecDeque},
};

use common::{storage::types::community_report::CommunityReport, utils::config::SearchSettings};

use super::{report_record, BuiltContext, ContextWriter, GraphView};
use crate::{
    engine::GraphQuery,
    scoring::{fuse_all, sort_by_fused_desc, FusionWeights, QueryTerms, Scored},
};

/// Community reports relevant to the query, across the hierarchy.
pub fn build_global_context(
    views: &[GraphView],
    query: &GraphQuery,
    dynamic_community_selection: bool,
    settings: &SearchSettings,
) -> BuiltContext {
    let terms = QueryTerms::parse(&query.query);
    let mut writer = ContextWriter::new(views.len());

    for view in views {
        writer.begin_index(&view.name);
        let selected = if dynamic_community_selection {
            select_dynamic(view, &terms, settings)
        } else {
            select_by_level(view, &terms, i64::from(query.community_level), settings)
        };
        writer.section(
            "reports",
            "Reports",
            &["id", "title", "content"],
            selected
                .into_iter()
                .map(|(report, relevance)| report_record(&view.name, report, relevance))
                .collect(),
        );
    }

    writer.finish(settings.max_context_tokens)
}

fn relevance(terms: &QueryTerms, report: &CommunityReport) -> f32 {
    terms.overlap(&format!("{} {}", report.title, report.summary))
}

/// Walks the hierarchy top-down from the root reports, descending only into
/// children of relevant reports. A relevant report is replaced by its relevant
/// children. Falls back to the highest-ranked roots when nothing is relevant.
fn select_dynamic<'a>(
    view: &'a GraphView,
    terms: &QueryTerms,
    settings: &SearchSettings,
) -> Vec<(&'a CommunityReport, f32)> {
    let by_community: HashMap<&str, &CommunityReport> = view
        .reports
        .iter()
        .map(|report| (report.community.as_str(), report))
        .collect();
    let children = children_by_community(view);
    let roots: Vec<&CommunityReport> = view
        .reports
        .iter()
        .filter(|report| report.parent_community().is_none() || report.level == 0)
        .collect();

    let mut relevant: HashMap<&str, f32> = HashMap::new();
    let mut queue: VecDeque<&CommunityReport> = roots.iter().copied().collect();
    while let Some(report) = queue.pop_front() {
        if relevant.contains_key(report.community.as_str()) {
            continue;
        }
        let score = relevance(terms, report);
        if score < settings.dynamic_threshold || score <= 0.0 {
            continue;
        }
        relevant.insert(report.community.as_str(), score);
        if let Some(kids) = children.get(report.community.as_str()) {
            queue.extend(kids.iter().filter_map(|kid| by_community.get(kid).copied()));
        }
    }

    let mut selected: Vec<(&CommunityReport, f32)> = relevant
        .iter()
        .filter(|(community, _)| {
            !children
                .get(*community)
                .is_some_and(|kids| kids.iter().any(|kid| relevant.contains_key(kid)))
        })
        .filter_map(|(community, score)| by_community.get(community).map(|r| (*r, *score)))
        .collect();

    if selected.is_empty() {
        selected = roots.into_iter().map(|report| (report, 0.0)).collect();
    }

    selected.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.rank_or_zero()
                    .partial_cmp(&a.rank_or_zero())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.community.cmp(&b.community))
    });
    selected.truncate(settings.global_max_reports);
    selected
}

/// Child lists from both the `children` column and the children's `parent`.
fn children_by_community(view: &GraphView) -> HashMap<&str, BTreeSet<&str>> {
    let mut children: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for report in &view.reports {
        let entry = children.entry(report.community.as_str()).or_default();
        entry.extend(report.children.iter().map(String::as_str));
        if let Some(parent) = report.parent_community() {
            children
                .entry(parent)
                .or_default()
                .insert(report.community.as_str());
        }
    }
    children
}

fn select_by_level<'a>(
    view: &'a GraphView,
    terms: &QueryTerms,
    max_level: i64,
    settings: &SearchSettings,
) -> Vec<(&'a CommunityReport, f32)> {
    let mut scored: Vec<Scored<CommunityReport>> = view
        .reports
        .iter()
        .filter(|report| report.level <= max_level)
        .map(|report| {
            Scored::new(report.clone())
                .with_lexical_score(relevance(terms, report))
                .with_rank_score(report.rank_or_zero() as f32)
        })
        .collect();
    fuse_all(&mut scored, FusionWeights::default());
    sort_by_fused_desc(&mut scored);

    scored
        .into_iter()
        .take(settings.global_max_reports)
        .filter_map(|scored| {
            view.reports
                .iter()
                .find(|report| report.id == scored.item.id)
                .map(|report| (report, scored.scores.lexical.unwrap_or(0.0)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::sample_index;
    use serde_json::Value;

    fn query(text: &str, community_level: u32) -> GraphQuery {
        GraphQuery {
            indexes: Vec::new(),
            community_level,
            response_type: "multiple paragraphs".into(),
            query: text.into(),
            result_limit: 10,
        }
    }

    fn communities(records: &Value) -> Vec<String> {
        records["reports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["community"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn dynamic_selection_replaces_parent_with_relevant_child() {
        let (_dir, index) = sample_index(3, 30);
        let view = GraphView::from_index(&index).unwrap();

        // Report 0 mentions the project as a whole, report 2 the network protocol.
        let built = build_global_context(
            std::slice::from_ref(&view),
            &query("project network protocol", 0),
            true,
            &SearchSettings::default(),
        );

        assert_eq!(communities(&built.records), vec!["2"]);
    }

    #[test]
    fn dynamic_selection_keeps_root_when_no_child_is_relevant() {
        let (_dir, index) = sample_index(3, 30);
        let view = GraphView::from_index(&index).unwrap();

        let built = build_global_context(
            std::slice::from_ref(&view),
            &query("graph queries", 0),
            true,
            &SearchSettings::default(),
        );

        assert_eq!(communities(&built.records), vec!["0"]);
    }

    #[test]
    fn dynamic_selection_falls_back_to_roots() {
        let (_dir, index) = sample_index(3, 30);
        let view = GraphView::from_index(&index).unwrap();

        let built = build_global_context(
            std::slice::from_ref(&view),
            &query("zebra", 0),
            true,
            &SearchSettings::default(),
        );

        assert_eq!(communities(&built.records), vec!["0"]);
    }

    #[test]
    fn level_selection_is_capped_by_community_level() {
        let (_dir, index) = sample_index(3, 30);
        let view = GraphView::from_index(&index).unwrap();

        let shallow = build_global_context(
            std::slice::from_ref(&view),
            &query("storage engine", 0),
            false,
            &SearchSettings::default(),
        );
        assert_eq!(communities(&shallow.records), vec!["0"]);

        let deep = build_global_context(
            std::slice::from_ref(&view),
            &query("storage engine", 1),
            false,
            &SearchSettings::default(),
        );
        let found = communities(&deep.records);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], "1");
    }
}
