use std::{cmp::Ordering, collections::HashSet};

use common::{storage::types::community_report::CommunityReport, utils::config::SearchSettings};

use super::{local::write_local_sections, report_record, BuiltContext, ContextWriter, GraphView};
use crate::{engine::GraphQuery, scoring::QueryTerms};

/// Primer community reports, then a local context steered toward the
/// communities those reports describe.
pub fn build_drift_context(
    views: &[GraphView],
    query: &GraphQuery,
    settings: &SearchSettings,
) -> BuiltContext {
    let terms = QueryTerms::parse(&query.query);
    let mut writer = ContextWriter::new(views.len());

    for view in views {
        writer.begin_index(&view.name);
        let primers = primer_reports(view, &terms, i64::from(query.community_level), settings);

        let primed: HashSet<&str> = primers
            .iter()
            .map(|(report, _)| report.community.as_str())
            .collect();
        let boosted: HashSet<String> = view
            .communities
            .iter()
            .filter(|community| primed.contains(community.community.as_str()))
            .flat_map(|community| community.entity_ids.iter().cloned())
            .collect();

        writer.section(
            "primer_reports",
            "Primer Reports",
            &["id", "title", "content"],
            primers
                .iter()
                .map(|(report, relevance)| report_record(&view.name, report, *relevance))
                .collect(),
        );
        write_local_sections(&mut writer, view, &terms, query, settings, &boosted);
    }

    writer.finish(settings.max_context_tokens)
}

fn primer_reports<'a>(
    view: &'a GraphView,
    terms: &QueryTerms,
    max_level: i64,
    settings: &SearchSettings,
) -> Vec<(&'a CommunityReport, f32)> {
    let mut primers: Vec<(&CommunityReport, f32)> = view
        .reports
        .iter()
        .filter(|report| report.level <= max_level)
        .map(|report| {
            let relevance = terms.overlap(&format!("{} {}", report.title, report.summary));
            (report, relevance)
        })
        .filter(|(_, relevance)| *relevance > 0.0)
        .collect();

    primers.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.level.cmp(&a.level))
            .then_with(|| a.community.cmp(&b.community))
    });
    primers.truncate(settings.drift_primer_reports);
    primers
}
