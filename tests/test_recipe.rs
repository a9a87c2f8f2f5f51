//! Integration test: recipe prep on train, bake on held-out frames

use polars::prelude::*;
use treetune::data::Schema;
use treetune::model::ForestSpec;
use treetune::recipe::Recipe;
use treetune::workflow::Workflow;

fn housing_df() -> DataFrame {
    df!(
        "pid" => &["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"],
        "sqft" => &[900.0, 1100.0, 1300.0, 1500.0, 1700.0, 1900.0, 2100.0, 2300.0],
        "age" => &[3.0, 12.0, 7.0, 30.0, 1.0, 18.0, 9.0, 25.0],
        "hood" => &["a", "a", "a", "a", "a", "a", "b", "c"],
        "price" => &[150.0, 190.0, 230.0, 240.0, 320.0, 330.0, 390.0, 410.0],
    )
    .unwrap()
}

fn schema_for(df: &DataFrame) -> Schema {
    Schema::infer(df, "price", &["pid"]).unwrap()
}

fn col_f64(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn col_str(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .into_no_null_iter()
        .map(|s| s.to_string())
        .collect()
}

// ============================================================================
// Train-only statistics
// ============================================================================

#[test]
fn test_normalize_uses_training_statistics_only() {
    let train = df!(
        "area" => &[10.0, 20.0, 30.0],
        "price" => &[1.0, 2.0, 3.0],
    )
    .unwrap();
    let schema = Schema::infer(&train, "price", &[]).unwrap();
    let prepared = Recipe::new(schema).step_normalize().prep(&train).unwrap();

    // train itself: mean 20, sd 10
    let baked_train = prepared.bake(&train).unwrap();
    let area = col_f64(&baked_train, "area");
    assert!((area[0] + 1.0).abs() < 1e-12);
    assert!(area[1].abs() < 1e-12);
    assert!((area[2] - 1.0).abs() < 1e-12);

    // a new frame is scaled with the same training stats, not its own
    let test = df!("area" => &[40.0], "price" => &[4.0]).unwrap();
    let baked_test = prepared.bake(&test).unwrap();
    assert!((col_f64(&baked_test, "area")[0] - 2.0).abs() < 1e-12);
}

#[test]
fn test_boxcox_lambda_comes_from_train() {
    let train = df!(
        "area" => &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0],
        "price" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
    )
    .unwrap();
    let schema = Schema::infer(&train, "price", &[]).unwrap();
    let prepared = Recipe::new(schema)
        .step_boxcox("area")
        .prep(&train)
        .unwrap();

    // identical inputs transform identically on any frame
    let a = df!("area" => &[10.0], "price" => &[0.0]).unwrap();
    let b = df!("area" => &[10.0, 99.0], "price" => &[0.0, 0.0]).unwrap();
    let va = col_f64(&prepared.bake(&a).unwrap(), "area")[0];
    let vb = col_f64(&prepared.bake(&b).unwrap(), "area")[0];
    assert_eq!(va.to_bits(), vb.to_bits());
}

#[test]
fn test_boxcox_rejects_non_positive_train_values() {
    let train = df!(
        "area" => &[1.0, 0.0, 3.0],
        "price" => &[1.0, 2.0, 3.0],
    )
    .unwrap();
    let schema = Schema::infer(&train, "price", &[]).unwrap();
    let result = Recipe::new(schema).step_boxcox("area").prep(&train);
    assert!(result.is_err());
}

// ============================================================================
// Collapse + one-hot interplay
// ============================================================================

#[test]
fn test_rare_levels_collapse_before_encoding() {
    let train = housing_df();
    let schema = schema_for(&train);

    // "b" and "c" each sit at 1/8 < 0.25, so both fold into "other"
    let prepared = Recipe::new(schema)
        .step_collapse(&["hood"], 0.25)
        .step_onehot()
        .prep(&train)
        .unwrap();

    let columns = prepared.predictor_columns();
    assert!(columns.contains(&"hood_a".to_string()));
    assert!(columns.contains(&"hood_other".to_string()));
    assert!(!columns.contains(&"hood_b".to_string()));
    assert!(!columns.contains(&"hood_c".to_string()));

    let baked = prepared.bake(&train).unwrap();
    let a = col_f64(&baked, "hood_a");
    let other = col_f64(&baked, "hood_other");
    for i in 0..train.height() {
        assert_eq!(a[i] + other[i], 1.0, "row {i} must land in exactly one level");
    }
    assert_eq!(other[6], 1.0);
    assert_eq!(other[7], 1.0);
}

#[test]
fn test_unseen_level_bakes_into_other() {
    let train = housing_df();
    let schema = schema_for(&train);
    let prepared = Recipe::new(schema)
        .step_collapse(&["hood"], 0.25)
        .step_onehot()
        .prep(&train)
        .unwrap();

    let test = df!(
        "pid" => &["q0"],
        "sqft" => &[1234.0],
        "age" => &[5.0],
        "hood" => &["zzz"],
        "price" => &[200.0],
    )
    .unwrap();
    let baked = prepared.bake(&test).unwrap();
    assert_eq!(col_f64(&baked, "hood_other")[0], 1.0);
    assert_eq!(col_f64(&baked, "hood_a")[0], 0.0);
}

// ============================================================================
// Bake contract
// ============================================================================

#[test]
fn test_bake_missing_predictor_is_error() {
    let train = housing_df();
    let schema = schema_for(&train);
    let prepared = Recipe::new(schema).step_normalize().prep(&train).unwrap();

    let broken = train.drop("sqft").unwrap();
    assert!(prepared.bake(&broken).is_err());
}

#[test]
fn test_bake_without_outcome_or_id_succeeds() {
    let train = housing_df();
    let schema = schema_for(&train);
    let prepared = Recipe::new(schema)
        .step_normalize()
        .step_onehot()
        .prep(&train)
        .unwrap();

    let unlabeled = train.drop("price").unwrap().drop("pid").unwrap();
    let baked = prepared.bake(&unlabeled).unwrap();
    assert_eq!(baked.height(), train.height());
}

#[test]
fn test_id_column_passes_through_untouched() {
    let train = housing_df();
    let schema = schema_for(&train);
    let prepared = Recipe::new(schema)
        .step_normalize()
        .step_onehot()
        .prep(&train)
        .unwrap();

    let baked = prepared.bake(&train).unwrap();
    assert_eq!(
        col_str(&baked, "pid"),
        vec!["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"]
    );
}

// ============================================================================
// Full stack through a workflow
// ============================================================================

#[test]
fn test_full_recipe_stack_fits_and_predicts() {
    let train = housing_df();
    let schema = schema_for(&train);

    // Step 1: declare the whole stack in order
    let recipe = Recipe::new(schema)
        .step_collapse(&["hood"], 0.25)
        .step_boxcox("sqft")
        .step_normalize()
        .step_onehot();

    // Step 2: fit the workflow, which preps the recipe internally
    let spec = ForestSpec::new().with_trees(15).with_seed(7);
    let fitted = Workflow::new(recipe, spec).fit(&train).unwrap();

    // Step 3: predict on an unlabeled frame with an unseen hood level
    let test = df!(
        "pid" => &["q0", "q1"],
        "sqft" => &[1000.0, 2000.0],
        "age" => &[4.0, 20.0],
        "hood" => &["a", "zzz"],
    )
    .unwrap();
    let predictions = fitted.predict(&test).unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p.is_finite()));
}
