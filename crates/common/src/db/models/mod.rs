//! SeaORM entity models
//!
//! Database entities for Foodgram

mod user;
mod ingredient;
mod ingredient_amount;
mod recipe;
mod recipe_ingredient_amount;
mod recipe_tag;
mod tag;
mod favorite_recipe;
mod shopping_cart;
mod subscription;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use ingredient::{
    Entity as IngredientEntity,
    Model as Ingredient,
    ActiveModel as IngredientActiveModel,
    Column as IngredientColumn,
};

pub use ingredient_amount::{
    Entity as IngredientAmountEntity,
    Model as IngredientAmount,
    ActiveModel as IngredientAmountActiveModel,
    Column as IngredientAmountColumn,
    Relation as IngredientAmountRelation,
};

pub use recipe::{
    Entity as RecipeEntity,
    Model as Recipe,
    ActiveModel as RecipeActiveModel,
    Column as RecipeColumn,
};

pub use recipe_ingredient_amount::{
    Entity as RecipeIngredientAmountEntity,
    Model as RecipeIngredientAmount,
    ActiveModel as RecipeIngredientAmountActiveModel,
    Column as RecipeIngredientAmountColumn,
    Relation as RecipeIngredientAmountRelation,
};

pub use recipe_tag::{
    Entity as RecipeTagEntity,
    Model as RecipeTag,
    ActiveModel as RecipeTagActiveModel,
    Column as RecipeTagColumn,
    Relation as RecipeTagRelation,
};

pub use tag::{
    validate_tag,
    Entity as TagEntity,
    Model as Tag,
    ActiveModel as TagActiveModel,
    Column as TagColumn,
};

pub use favorite_recipe::{
    Entity as FavoriteRecipeEntity,
    Model as FavoriteRecipe,
    ActiveModel as FavoriteRecipeActiveModel,
    Column as FavoriteRecipeColumn,
};

pub use shopping_cart::{
    Entity as ShoppingCartEntity,
    Model as ShoppingCartEntry,
    ActiveModel as ShoppingCartActiveModel,
    Column as ShoppingCartColumn,
};

pub use subscription::{
    Entity as SubscriptionEntity,
    Model as Subscription,
    ActiveModel as SubscriptionActiveModel,
    Column as SubscriptionColumn,
};
