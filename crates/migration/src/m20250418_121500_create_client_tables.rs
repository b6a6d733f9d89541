//! Migration to create the OAuth2 client registry tables.
//!
//! Creates tables for:
//! - oauth2_clients: registered OAuth2 clients
//! - client_branding: per-client consent/login screen branding

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Clients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Clients::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::ClientId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2Clients::SecretHash).string().null())
                    .col(ColumnDef::new(OAuth2Clients::Name).string().not_null())
                    .col(ColumnDef::new(OAuth2Clients::Description).string().null())
                    .col(
                        ColumnDef::new(OAuth2Clients::RedirectUris)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::GrantTypes)
                            .text()
                            .not_null()
                            .default("authorization_code"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::Scopes)
                            .text()
                            .not_null()
                            .default("openid profile email"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::AccessTokenTtl)
                            .big_integer()
                            .not_null()
                            .default(3600),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::RefreshTokenTtl)
                            .big_integer()
                            .not_null()
                            .default(604800),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::IsPublic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Clients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClientBranding::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClientBranding::ClientId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClientBranding::LogoUrl).string().null())
                    .col(ColumnDef::new(ClientBranding::PrimaryColor).string().null())
                    .col(
                        ColumnDef::new(ClientBranding::SecondaryColor)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClientBranding::BackgroundColor)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(ClientBranding::TextColor).string().null())
                    .col(ColumnDef::new(ClientBranding::CompanyName).string().null())
                    .col(
                        ColumnDef::new(ClientBranding::PrivacyPolicyUrl)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClientBranding::TermsOfServiceUrl)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(ClientBranding::CustomCss).text().null())
                    .col(
                        ColumnDef::new(ClientBranding::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClientBranding::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Clients::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Clients {
    Table,
    Id,
    ClientId,
    SecretHash,
    Name,
    Description,
    RedirectUris,
    GrantTypes,
    Scopes,
    AccessTokenTtl,
    RefreshTokenTtl,
    IsPublic,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ClientBranding {
    Table,
    ClientId,
    LogoUrl,
    PrimaryColor,
    SecondaryColor,
    BackgroundColor,
    TextColor,
    CompanyName,
    PrivacyPolicyUrl,
    TermsOfServiceUrl,
    CustomCss,
    UpdatedAt,
}
