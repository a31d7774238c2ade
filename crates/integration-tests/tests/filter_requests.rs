//! Filter request reads against a real SQLite catalog
//!
//! Paging, ordering, selection, date ranges and the has-next-page probe.

mod common;

use common::Catalog;
use strata_core::application::Row;
use strata_core::domain::{Article, ArticleSummary, Entity, Value};
use strata_core::query::{FilterRequest, Join, Transform};
use strata_core::response::PaginatedResult;
use tokio_util::sync::CancellationToken;

fn titles(rows: &[Row<Article>]) -> Vec<String> {
    rows.iter()
        .map(|row| match row {
            Row::Item(article) => article.title.clone(),
            Row::Projected(record) => format!("{:?}", record.get("title")),
        })
        .collect()
}

#[tokio::test]
async fn test_pages_are_disjoint_slices() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(25, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let mut seen = Vec::new();
    for (page, expected) in [(1, 10), (2, 10), (3, 5)] {
        let request = FilterRequest::new(page, 10).order_by(["title"]);
        let data = articles.filter_data(&request, None).await.unwrap();

        assert_eq!(data.rows.len(), expected, "page {}", page);
        assert_eq!(data.total_count, 25);
        seen.extend(titles(&data.rows));
    }

    let mut unique = seen.clone();
    unique.dedup();
    assert_eq!(seen.len(), 25);
    assert_eq!(unique, seen);
    assert_eq!(seen.first().map(String::as_str), Some("Article 01"));
    assert_eq!(seen.last().map(String::as_str), Some("Article 25"));
}

#[tokio::test]
async fn test_page_zero_and_one_return_the_same_slice() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(12, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let zero = articles
        .filter_data(&FilterRequest::new(0, 5).order_by(["title"]), None)
        .await
        .unwrap();
    let one = articles
        .filter_data(&FilterRequest::new(1, 5).order_by(["title"]), None)
        .await
        .unwrap();

    assert_eq!(titles(&zero.rows), titles(&one.rows));
    assert_eq!(zero.page, 0);
    assert_eq!(one.page, 1);
}

#[tokio::test]
async fn test_length_is_clamped() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(60, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let large = articles
        .filter_data(&FilterRequest::new(1, 1000), None)
        .await
        .unwrap();
    assert_eq!(large.rows.len(), 50);
    assert_eq!(large.length, 50);

    let negative = articles
        .filter_data(&FilterRequest::new(-1, -5), None)
        .await
        .unwrap();
    assert_eq!(negative.rows.len(), 1);
    assert_eq!(negative.length, 1);
    assert_eq!(negative.page, 0);
}

#[tokio::test]
async fn test_has_next_page_probes_one_page_ahead() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(25, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    // probe offsets 20, 30 and 40 over 25 rows
    let expected = [(1, true), (2, false), (3, false)];
    for (page, has_next) in expected {
        let data = articles
            .filter_data(&FilterRequest::new(page, 10), None)
            .await
            .unwrap();
        assert_eq!(data.has_next_page, has_next, "page {}", page);
    }
}

#[tokio::test]
async fn test_ordering_tokens() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(3, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let descending = articles
        .filter_data(&FilterRequest::new(1, 10).order_by(["title desc"]), None)
        .await
        .unwrap();
    assert_eq!(
        titles(&descending.rows),
        vec!["Article 03", "Article 02", "Article 01"]
    );

    let ascending = articles
        .filter_data(
            &FilterRequest::new(1, 10).order_by(["bogus desc", "TITLE"]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        titles(&ascending.rows),
        vec!["Article 01", "Article 02", "Article 03"]
    );
}

#[tokio::test]
async fn test_default_ordering_is_most_recently_modified_first() {
    let catalog = Catalog::new().await;
    catalog.clock.set(100);
    catalog.seed_articles(1, "seed").await;
    catalog.clock.set(300);
    let newer = catalog.seed_articles(1, "seed").await;
    catalog.clock.set(200);
    let middle = catalog.seed_articles(1, "seed").await;

    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();
    let data = articles
        .filter_data(&FilterRequest::new(1, 10).order_by(["unknown"]), None)
        .await
        .unwrap();

    let ids: Vec<i64> = data.into_items().iter().map(|a| a.id).collect();
    assert_eq!(ids[0], newer[0]);
    assert_eq!(ids[1], middle[0]);
}

#[tokio::test]
async fn test_date_range_bounds_modified_on() {
    let catalog = Catalog::new().await;
    for secs in [100, 200, 300] {
        catalog.clock.set(secs);
        catalog.seed_articles(2, "seed").await;
    }
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let bounded = articles
        .filter_data(&FilterRequest::new(1, 50).between(150, 250), None)
        .await
        .unwrap();
    assert_eq!(bounded.total_count, 2);
    assert!(bounded
        .into_items()
        .iter()
        .all(|a| a.audit.modified_on == Some(200)));

    // a non-positive upper bound is ignored
    let open_ended = articles
        .filter_data(&FilterRequest::new(1, 50).between(150, 0), None)
        .await
        .unwrap();
    assert_eq!(open_ended.total_count, 4);
}

#[tokio::test]
async fn test_select_projects_known_fields_only() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(2, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let projected = articles
        .filter_data(&FilterRequest::new(1, 10).select(["Title", "nope"]), None)
        .await
        .unwrap();
    let record = projected.rows[0].as_projected().unwrap();
    assert_eq!(record.len(), 1);
    assert!(matches!(record.get("title"), Some(Value::Text(_))));

    let unknown_only = articles
        .filter_data(&FilterRequest::new(1, 10).select(["nope"]), None)
        .await
        .unwrap();
    assert!(matches!(unknown_only.rows[0], Row::Item(_)));
}

#[tokio::test]
async fn test_predicate_narrows_count_but_not_probe() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(25, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let predicate: Transform<'_, Article> =
        Box::new(|query| query.filter(Article::TITLE.like("Article 0%")));
    let data = articles
        .filter_data(&FilterRequest::new(1, 5), Some(predicate))
        .await
        .unwrap();

    assert_eq!(data.total_count, 9);
    assert_eq!(data.rows.len(), 5);
    // the probe runs on the unfiltered set: row 11 of 25 exists
    assert!(data.has_next_page);
}

#[tokio::test]
async fn test_soft_deleted_rows_are_excluded_from_filter_requests() {
    let catalog = Catalog::new().await;
    let ids = catalog.seed_articles(5, "seed").await;
    let uow = catalog.unit_of_work();
    uow.soft_delete_range::<Article>(&ids[..2], "ops", &CancellationToken::new())
        .await
        .unwrap();

    let data = uow
        .repo::<Article>()
        .unwrap()
        .filter_data(&FilterRequest::new(1, 10), None)
        .await
        .unwrap();
    assert_eq!(data.total_count, 3);
    assert_eq!(catalog.raw_count("articles").await, 5);
}

#[tokio::test]
async fn test_projected_filter_selects_dto_fields() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(4, "seed").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();

    let (rows, total) = articles
        .filter_projected::<ArticleSummary>(
            &FilterRequest::new(1, 3).order_by(["title desc"]).select(["id", "title"]),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(rows.len(), 3);
    let first = rows[0].as_projected().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.get("title"), Some(&Value::from("Article 04")));

    let (full, _) = articles
        .filter_projected::<ArticleSummary>(&FilterRequest::new(1, 3), None, None)
        .await
        .unwrap();
    assert!(matches!(&full[0], Row::Item(ArticleSummary { .. })));
}

/// Joins every article to each article sharing its label
fn same_label() -> Transform<'static, Article> {
    Box::new(|query| {
        query.join(Join::new(
            Article::SCHEMA.table,
            Article::LABEL_ID.name,
            Article::LABEL_ID.name,
        ))
    })
}

#[tokio::test]
async fn test_projected_filter_collapses_rows_repeated_by_joins() {
    let catalog = Catalog::new().await;
    let news = catalog.seed_label("news").await;
    let uow = catalog.unit_of_work();
    let articles = uow.repo::<Article>().unwrap();
    articles
        .insert_many(vec![
            Article::new("n1", None).with_label(news),
            Article::new("n2", None).with_label(news),
            Article::new("n3", None).with_label(news),
        ])
        .await
        .unwrap();
    uow.save("seed", &CancellationToken::new()).await.unwrap();

    let (rows, total) = articles
        .filter_projected::<ArticleSummary>(
            &FilterRequest::new(1, 10).order_by(["title"]),
            Some(same_label()),
            None,
        )
        .await
        .unwrap();
    let summaries: Vec<String> = rows
        .iter()
        .map(|row| match row {
            Row::Item(summary) => summary.title.clone(),
            Row::Projected(record) => format!("{:?}", record.get("title")),
        })
        .collect();
    assert_eq!(total, 3);
    assert_eq!(summaries, vec!["n1", "n2", "n3"]);

    // the entity variant keeps the repeated rows
    let repeated = articles
        .filter_data_with_includes(&FilterRequest::new(1, 50), Some(same_label()), None)
        .await
        .unwrap();
    assert_eq!(repeated.total_count, 9);
    assert_eq!(repeated.rows.len(), 9);
}

#[tokio::test]
async fn test_paginated_envelope_wire_shape() {
    let catalog = Catalog::new().await;
    catalog.seed_articles(25, "seed").await;
    let uow = catalog.unit_of_work();
    let data = uow
        .repo::<Article>()
        .unwrap()
        .filter_data(&FilterRequest::new(2, 10), None)
        .await
        .unwrap();

    let envelope = PaginatedResult::success(
        data.rows,
        data.total_count,
        data.page,
        data.length,
        None,
    );
    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["succeeded"], true);
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["currentPage"], 2);
    assert_eq!(json["pageSize"], 10);
    assert_eq!(json["totalPages"], 3);
    assert_eq!(json["totalCount"], 25);
    assert_eq!(json["hasPreviousPage"], true);
    assert_eq!(json["hasNextPage"], true);
    assert_eq!(json["data"].as_array().unwrap().len(), 10);
    assert!(json["data"][0]["createdBy"].is_string());
}
