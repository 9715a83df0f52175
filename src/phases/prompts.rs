// src/phases/prompts.rs — Phase prompt templates (minijinja)

use minijinja::Environment;
use std::sync::OnceLock;

use crate::infra::errors::AgentError;

pub const UNDERSTANDING: &str = "\
We are entering a tabular data competition.

## Competition Info:
- Task: {{ task_type }}
- Metric: {{ metric }}
- Target column: {{ target_column }}
- Data files: {{ files }}
{%- if num_samples %}
- Samples: {{ num_samples }}, features: {{ num_features }}
{%- endif %}

Respond briefly with:
1. What this competition likely requires and which pitfalls the metric implies.
2. A modeling strategy (validation scheme, model families worth trying).
3. Three to five feature engineering ideas, each on its own line starting with \"- \".
";

pub const EDA: &str = "\
You are a data scientist. Generate Python code for EDA based on the following competition info.

## Competition Info:
- Task: {{ task_type }}
- Metric: {{ metric }}
- Target column: {{ target_column }}
- Files: {{ files }}

## Requirements:
1. Load train.csv
2. Calculate basic statistics
3. Check missing values
4. Check target distribution
5. Output results in JSON format

## Output Format:
At the end of the code, print a JSON object:
```
print(json.dumps({
    \"num_samples\": number_of_rows,
    \"num_features\": number_of_features,
    \"missing_columns\": [columns_with_missing],
    \"numeric_columns\": [numeric_columns],
    \"categorical_columns\": [categorical_columns],
    \"insights\": [\"insight1\", \"insight2\"]
}))
```

Generate only the code without explanations.
";

pub const FEATURE_ENGINEERING: &str = "\
You are a Kaggle Grandmaster. Generate Python code for feature engineering based on the following info.

## Competition Info:
- Task: {{ task_type }}
- Target column: {{ target_column }}

## EDA Results:
- Numeric columns: {{ numeric_columns }}
- Categorical columns: {{ categorical_columns }}
{%- if feature_ideas %}

## Features to Generate (pick 1-3):
{%- for idea in feature_ideas %}
- {{ idea }}
{%- endfor %}
{%- else %}

## Features to Generate:
Invent 1-3 promising new features{% if tried_features %}, avoiding these already tried:
{%- for f in tried_features %}
- {{ f }}
{%- endfor %}{% endif %}
{%- endif %}

## Requirements:
1. Load train.csv (or train_fe.csv if it exists)
2. Generate new features
3. Save as train_fe.csv
4. Apply the same transformations to test.csv and save as test_fe.csv
5. Output results in JSON format

## Output Format:
```
print(json.dumps({
    \"new_features\": [\"feature_name1\", \"feature_name2\"],
    \"description\": \"what was done\"
}))
```

Generate only the code without explanations.
";

pub const MODELING_BASELINE: &str = "\
You are a Kaggle Grandmaster. Generate Python code for a baseline model.

## Competition Info:
- Task: {{ task_type }}
- Metric: {{ metric }}
- Target column: {{ target_column }}

## EDA Results:
- Numeric columns: {{ numeric_columns }}
- Categorical columns: {{ categorical_columns }}

## Requirements:
1. Load train.csv (or train_fe.csv if it exists)
2. Preprocessing (missing value imputation, label encoding)
3. Train LightGBM with 5-fold CV
4. Save predictions for test.csv as submission.csv

## Output Format:
```
print(json.dumps({
    \"cv_score\": cv_score,
    \"fold_scores\": [score1, score2, score3, score4, score5],
    \"model_type\": \"lightgbm\"
}))
```

Generate only the code without explanations.
";

pub const MODELING_IMPROVE: &str = "\
You are a Kaggle Grandmaster. Improve the model based on the following info.

## Competition Info:
- Task: {{ task_type }}
- Metric: {{ metric }}
- Target column: {{ target_column }}
{%- if best_score %}
- Current best score: {{ best_score }}
{%- endif %}
{%- if new_features %}

## New Features:
{%- for f in new_features %}
- {{ f }}
{%- endfor %}
{%- endif %}

## Improvement Ideas:
- Hyperparameter tuning (learning_rate, num_leaves, etc.)
- Try XGBoost or CatBoost
- Feature selection based on importance
- Different CV strategy (StratifiedKFold, GroupKFold)

## Requirements:
1. Load train_fe.csv (or train.csv)
2. Apply improvements
3. Train with 5-fold CV
4. Save predictions as submission.csv

## Output Format:
```
print(json.dumps({
    \"cv_score\": cv_score,
    \"model_type\": \"model_name\",
    \"improvement\": \"what was improved\"
}))
```

Generate only the code without explanations.
";

pub const ENSEMBLE: &str = "\
You are a Kaggle Grandmaster. Generate ensemble code.

## Competition Info:
- Task: {{ task_type }}
- Metric: {{ metric }}
- Target column: {{ target_column }}

## Available Models:
{%- for m in models %}
- {{ m.model_type }} (CV: {{ m.cv_score }})
{%- endfor %}

## Ensemble Strategy:
{{ strategy }}

## Requirements:
1. Train multiple models (LightGBM, XGBoost, CatBoost)
2. Apply ensemble ({{ ensemble_type }})
3. Calculate CV score
4. Save predictions as submission.csv

## Output Format:
```
print(json.dumps({
    \"cv_score\": cv_score,
    \"ensemble_type\": \"method\",
    \"models_used\": [\"model1\", \"model2\"]
}))
```

Generate only the code without explanations.
";

/// Appended to a phase prompt when regenerating after a failed attempt.
pub const RETRY_SUFFIX: &str = "\n\n## Previous Attempt Failed:\n{error}\n\nFix the problem and provide the corrected code only, without explanations.";

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        for (name, source) in [
            ("understanding", UNDERSTANDING),
            ("eda", EDA),
            ("feature_engineering", FEATURE_ENGINEERING),
            ("modeling_baseline", MODELING_BASELINE),
            ("modeling_improve", MODELING_IMPROVE),
            ("ensemble", ENSEMBLE),
        ] {
            env.add_template(name, source)
                .expect("static template must parse");
        }
        env
    })
}

/// Render a named template with the given context.
pub fn render(name: &str, ctx: minijinja::Value) -> Result<String, AgentError> {
    let tmpl = environment()
        .get_template(name)
        .map_err(|e| AgentError::Infrastructure(format!("missing template '{name}': {e}")))?;
    tmpl.render(ctx)
        .map_err(|e| AgentError::Infrastructure(format!("template '{name}': {e}")))
}

/// Append the failed-attempt context to a prompt for regeneration.
pub fn with_retry_context(prompt: &str, error: &str) -> String {
    format!("{prompt}{}", RETRY_SUFFIX.replace("{error}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_all_templates_render() {
        let eda = render(
            "eda",
            context! {
                task_type => "classification",
                metric => "auc",
                target_column => "target",
                files => vec!["train.csv", "test.csv"],
            },
        )
        .unwrap();
        assert!(eda.contains("Load train.csv"));
        assert!(eda.contains("num_samples"));
    }

    #[test]
    fn test_fe_template_lists_ideas() {
        let out = render(
            "feature_engineering",
            context! {
                task_type => "classification",
                target_column => "target",
                numeric_columns => vec!["age"],
                categorical_columns => vec!["sex"],
                feature_ideas => vec!["family size"],
                tried_features => Vec::<String>::new(),
            },
        )
        .unwrap();
        assert!(out.contains("- family size"));
        assert!(!out.contains("Invent 1-3"));
    }

    #[test]
    fn test_fe_template_invents_when_no_ideas() {
        let out = render(
            "feature_engineering",
            context! {
                task_type => "classification",
                target_column => "target",
                numeric_columns => Vec::<String>::new(),
                categorical_columns => Vec::<String>::new(),
                feature_ideas => Vec::<String>::new(),
                tried_features => vec!["family size"],
            },
        )
        .unwrap();
        assert!(out.contains("Invent 1-3"));
        assert!(out.contains("- family size"));
    }

    #[test]
    fn test_unknown_template_errors() {
        assert!(render("nope", context! {}).is_err());
    }

    #[test]
    fn test_retry_context_appends_error() {
        let out = with_retry_context("base prompt", "NameError: x");
        assert!(out.starts_with("base prompt"));
        assert!(out.contains("NameError: x"));
        assert!(out.contains("corrected code only"));
    }
}
