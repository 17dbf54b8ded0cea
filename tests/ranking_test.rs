//! Ranking Tests
//!
//! `top_words` returns at most `limit` entries, highest count first, with
//! ties in storage order.

mod common;

use wordtally::{Error, WordCount};

#[tokio::test]
async fn ranking_orders_by_count_with_stable_ties() {
    let (_dir, path) = common::create_temp_db_file("ranking.db");
    let tally = common::open_tally(&path).await;

    // Rows are created in word order: a, b, c, d.
    tally.add_words("a,b,c,d").await.unwrap();
    tally.add_words("a,a,a,a,b,b,b,b,b,b,b,b,c,d,d,d,d,d,d,d,d").await.unwrap();

    let top = tally.top_words(3).await.unwrap();
    assert_eq!(
        top,
        vec![
            WordCount::new("b", 9),
            WordCount::new("d", 9),
            WordCount::new("a", 5),
        ]
    );

    // Same state, same answer.
    assert_eq!(tally.top_words(3).await.unwrap(), top);

    tally.shutdown().await;
}

#[tokio::test]
async fn ranking_returns_fewer_rows_than_limit() {
    let (_dir, path) = common::create_temp_db_file("ranking_short.db");
    let tally = common::open_tally(&path).await;

    assert!(tally.top_words(10).await.unwrap().is_empty());

    tally.add_words("solo").await.unwrap();
    assert_eq!(
        tally.top_words(10).await.unwrap(),
        vec![WordCount::new("solo", 1)]
    );

    tally.shutdown().await;
}

#[tokio::test]
async fn ranking_rejects_zero_limit() {
    let (_dir, path) = common::create_temp_db_file("ranking_zero.db");
    let tally = common::open_tally(&path).await;

    let err = tally.top_words(0).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    tally.shutdown().await;
}

#[tokio::test]
async fn default_limit_comes_from_config() {
    let (_dir, path) = common::create_temp_db_file("ranking_default.db");
    let config = wordtally::TallyConfig {
        top_words_limit: 2,
        ..common::test_config(&path)
    };
    let tally = wordtally::WordTally::open(config).await.unwrap();

    tally.add_words("x,y,y,z,z,z").await.unwrap();
    assert_eq!(
        tally.top_words_default().await.unwrap(),
        vec![WordCount::new("z", 3), WordCount::new("y", 2)]
    );

    tally.shutdown().await;
}

#[tokio::test]
async fn ranking_serializes_as_word_count_pairs() {
    let (_dir, path) = common::create_temp_db_file("ranking_json.db");
    let tally = common::open_tally(&path).await;

    tally.add_words("cat,dog,cat").await.unwrap();
    let json = serde_json::to_string(&tally.top_words(2).await.unwrap()).unwrap();
    assert_eq!(json, r#"[{"word":"cat","count":2},{"word":"dog","count":1}]"#);

    tally.shutdown().await;
}
