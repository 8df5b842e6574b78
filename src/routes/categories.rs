//! Route handlers for listing and managing categories.
//!
//! Categories are global, so the listing is cached under a single shared
//! namespace and every mutation invalidates both the category entries and
//! all analytics entries, since breakdowns for any user embed category
//! names and colors.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::Claims,
    cache::{CacheKey, CacheTag, TtlClass, read_through},
    category::{
        Category, CategoryName, CategoryUpdate, DEFAULT_CATEGORY_COLOR, NewCategory,
        count_referencing_transactions, create_category, delete_category, get_all_categories,
        name_is_taken, update_category, validate_color, validate_description,
    },
    database_id::DatabaseID,
    policy::{Capability, authorize},
};

use crate::category::get_category as get_category_by_id;

#[derive(Debug, Serialize)]
struct CategoryListResponse {
    categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
struct CategoryMutationResponse {
    message: &'static str,
    category: Category,
}

/// A route handler for listing all categories.
pub(crate) async fn get_categories(
    State(state): State<AppState>,
    claims: Claims,
    uri: Uri,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let cache_key = CacheKey::new(&uri, claims.sub);

    read_through(
        &state.cache,
        cache_key,
        TtlClass::Categories,
        &[CacheTag::Categories],
        || {
            let connection = state
                .db_connection
                .lock()
                .expect("Could not acquire database lock");

            Ok(CategoryListResponse {
                categories: get_all_categories(&connection)?,
            })
        },
    )
    .await
}

/// A route handler for getting a category by its database ID.
pub(crate) async fn get_category(
    State(state): State<AppState>,
    claims: Claims,
    Path(category_id): Path<DatabaseID>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ReadData)?;

    let connection = state
        .db_connection
        .lock()
        .expect("Could not acquire database lock");

    let category = get_category_by_id(category_id, &connection)?;

    Ok(Json(category).into_response())
}

/// The body accepted when creating a category.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateCategoryData {
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
}

impl CreateCategoryData {
    fn validate(self) -> Result<NewCategory, Error> {
        let name = CategoryName::new(self.name.as_deref().unwrap_or_default())?;

        if let Some(ref description) = self.description {
            validate_description(description)?;
        }

        let color = match self.color {
            Some(color) => {
                validate_color(&color)?;
                color
            }
            None => DEFAULT_CATEGORY_COLOR.to_owned(),
        };

        Ok(NewCategory {
            name,
            description: self.description,
            color,
        })
    }
}

/// A route handler for creating a new category. Admin only.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn create_category_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Json(data): Json<CreateCategoryData>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ManageCategories)?;

    let new_category = data.validate()?;

    let category = {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        // The pre-check gives the friendly error; the UNIQUE constraint on
        // the name remains the authoritative guard.
        if name_is_taken(&new_category.name, None, &connection)? {
            return Err(Error::Conflict(
                "Category with this name already exists".to_owned(),
            ));
        }

        create_category(new_category, &connection)?
    };

    invalidate_category_namespaces(&state).await;

    Ok((
        StatusCode::CREATED,
        Json(CategoryMutationResponse {
            message: "Category created successfully",
            category,
        }),
    )
        .into_response())
}

/// The body accepted when updating a category. All fields optional.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateCategoryData {
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
}

impl UpdateCategoryData {
    fn validate(self) -> Result<CategoryUpdate, Error> {
        let name = self
            .name
            .as_deref()
            .map(CategoryName::new)
            .transpose()?;

        if let Some(ref description) = self.description {
            validate_description(description)?;
        }

        if let Some(ref color) = self.color {
            validate_color(color)?;
        }

        Ok(CategoryUpdate {
            name,
            description: self.description,
            color: self.color,
        })
    }
}

/// A route handler for partially updating a category. Admin only.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn update_category_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Path(category_id): Path<DatabaseID>,
    Json(data): Json<UpdateCategoryData>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ManageCategories)?;

    let update = data.validate()?;

    let category = {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        if let Some(ref name) = update.name {
            if name_is_taken(name, Some(category_id), &connection)? {
                return Err(Error::Conflict(
                    "Category with this name already exists".to_owned(),
                ));
            }
        }

        update_category(category_id, update, &connection)?
    };

    invalidate_category_namespaces(&state).await;

    Ok(Json(CategoryMutationResponse {
        message: "Category updated successfully",
        category,
    })
    .into_response())
}

/// A route handler for deleting a category. Admin only.
///
/// Deletion is refused while any transaction, for any user, still references
/// the category.
///
/// # Panics
/// Panics if the lock for the database connection is already held by the
/// same thread.
pub(crate) async fn delete_category_endpoint(
    State(state): State<AppState>,
    claims: Claims,
    Path(category_id): Path<DatabaseID>,
) -> Result<Response, Error> {
    authorize(claims.role, Capability::ManageCategories)?;

    {
        let connection = state
            .db_connection
            .lock()
            .expect("Could not acquire database lock");

        if count_referencing_transactions(category_id, &connection)? > 0 {
            return Err(Error::Conflict(
                "Cannot delete category that is being used by transactions".to_owned(),
            ));
        }

        delete_category(category_id, &connection)?;
    }

    invalidate_category_namespaces(&state).await;

    Ok(Json(serde_json::json!({
        "message": "Category deleted successfully",
    }))
    .into_response())
}

/// Remove the cache namespaces a category mutation affects. Categories are
/// shared by everyone, so this covers the category entries and every user's
/// analytics.
async fn invalidate_category_namespaces(state: &AppState) {
    state
        .cache
        .invalidate(&[CacheTag::Categories, CacheTag::Analytics])
        .await;
}
