//! End-to-end pipeline tests: parse -> rewrite -> execute -> shape, driven
//! through the public [`Gateway`] API against the spec's 8-product fixture
//! (spec §8 end-to-end scenarios).

use searchgate::agg::parse_aggs;
use searchgate::query::{join_rewriter, parse_query, QueryNode};
use searchgate::response::shape_search_response;
use searchgate::search::{execute_search, SearchRequest};
use searchgate::value::Document;
use searchgate::{Config, Gateway};
use serde_json::json;

fn fixture() -> Gateway {
    let gateway = Gateway::new(Config::default());
    gateway.engine().create_index("products");
    let rows = [
        ("prod1", "electronics", 1299.99, 4.5),
        ("prod2", "electronics", 899.99, 4.8),
        ("prod3", "electronics", 199.99, 4.2),
        ("prod4", "electronics", 129.99, 4.6),
        ("prod5", "sports", 49.99, 4.3),
        ("prod6", "sports", 79.99, 4.1),
        ("prod7", "home", 59.99, 3.9),
        ("prod8", "home", 499.99, 4.7),
    ];
    for (id, category, price, rating) in rows {
        let doc = Document::from_source("products", id, json!({"category": category, "price": price, "rating": rating}));
        gateway.engine().index_document("products", id, doc).unwrap();
    }
    gateway
}

#[test]
fn range_query_plus_terms_aggregation_scopes_both_hits_and_buckets() {
    let gateway = fixture();

    let query = parse_query(&json!({"range": {"price": {"gte": 100.0}}})).unwrap();
    let query = join_rewriter::rewrite(query, "products", gateway.engine()).unwrap();
    let (aggs, warnings) = parse_aggs(&json!({"categories": {"terms": {"field": "category"}}})).unwrap();
    assert!(warnings.is_empty());

    let req = SearchRequest { query, size: 10, aggs, ..SearchRequest::default() };
    let outcome = execute_search("products", gateway.engine(), &req).unwrap();

    assert_eq!(outcome.total, 5);
    let body = shape_search_response("products", &outcome, None);
    assert_eq!(body["hits"]["total"]["value"], json!(5));

    let buckets = body["aggregations"]["categories"]["buckets"].as_array().unwrap();
    let electronics = buckets.iter().find(|b| b["key"] == json!("electronics")).unwrap();
    let sports = buckets.iter().find(|b| b["key"] == json!("sports")).unwrap();
    assert_eq!(electronics["doc_count"], json!(4));
    assert_eq!(sports["doc_count"], json!(1));
}

#[test]
fn match_all_with_size_zero_still_sweeps_metric_aggregations() {
    let gateway = fixture();
    let (aggs, _) = parse_aggs(&json!({"avg_price": {"avg": {"field": "price"}}})).unwrap();
    let req = SearchRequest { query: QueryNode::match_all(), size: 0, aggs, ..SearchRequest::default() };
    let outcome = execute_search("products", gateway.engine(), &req).unwrap();

    assert!(outcome.hits.is_empty());
    let body = shape_search_response("products", &outcome, None);
    let avg = body["aggregations"]["avg_price"]["value"].as_f64().unwrap();
    assert!((avg - 402.49).abs() < 1.0, "got {avg}");
}

#[test]
fn scroll_pages_cover_every_hit_exactly_once() {
    let gateway = fixture();
    let query = QueryNode::match_all();
    let sort = vec![searchgate::engine::SortField::asc("_id")];

    let page_size = 3;
    let id = gateway.scrolls.create("products", query.clone(), sort.clone(), page_size, vec![], vec![], std::time::Duration::from_secs(60));

    let mut seen = std::collections::HashSet::new();
    let mut pages = 0;
    loop {
        let cursor = gateway.scrolls.get(&id).unwrap();
        let use_search_after = cursor.use_search_after();
        let req = SearchRequest {
            query: cursor.query.clone(),
            from: if use_search_after { 0 } else { cursor.from },
            size: cursor.size,
            sort: cursor.sort.clone(),
            search_after: if use_search_after { cursor.last_sort.clone() } else { None },
            ..SearchRequest::default()
        };
        let outcome = execute_search("products", gateway.engine(), &req).unwrap();
        if outcome.hits.is_empty() {
            gateway.scrolls.delete(&id).unwrap();
            break;
        }
        for hit in &outcome.hits {
            seen.insert(hit.id.clone());
        }
        pages += 1;
        let last_sort = outcome.hits.last().map(|h| h.sort.clone());
        gateway.scrolls.update(&id, last_sort).unwrap();
    }

    assert_eq!(seen.len(), 8);
    assert_eq!(pages, 3); // ceil(8/3)
    assert!(gateway.scrolls.get(&id).is_err());
}
