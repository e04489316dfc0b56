use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_order_tables::Migration),
            Box::new(m20240101_000002_create_customer_tables::Migration),
            Box::new(m20240101_000003_create_catalog_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Orders::Parent)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::Type).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).big_integer().null())
                        .col(ColumnDef::new(Orders::CustomerId).big_integer().not_null())
                        .col(ColumnDef::new(Orders::Email).string().not_null())
                        .col(ColumnDef::new(Orders::Ip).string().not_null())
                        .col(ColumnDef::new(Orders::Gateway).string().not_null())
                        .col(ColumnDef::new(Orders::Mode).string().not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentKey)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::TaxRateId).big_integer().null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal().not_null().default(0))
                        .col(ColumnDef::new(Orders::Discount).decimal().not_null().default(0))
                        .col(ColumnDef::new(Orders::Tax).decimal().not_null().default(0))
                        .col(ColumnDef::new(Orders::Total).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Orders::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DateModified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DateCompleted)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DateRefundable)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_parent")
                        .table(Orders::Table)
                        .col(Orders::Parent)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderItems::Parent).big_integer().null())
                        .col(ColumnDef::new(OrderItems::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::PriceId).big_integer().null())
                        .col(
                            ColumnDef::new(OrderItems::CartIndex)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderItems::Status).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(OrderItems::Amount).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(OrderItems::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderItems::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderItems::Tax).decimal().not_null().default(0))
                        .col(ColumnDef::new(OrderItems::Total).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(OrderItems::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::DateModified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderAdjustments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderAdjustments::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderAdjustments::Parent).big_integer().null())
                        .col(
                            ColumnDef::new(OrderAdjustments::ObjectId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderAdjustments::ObjectType).string().not_null())
                        .col(ColumnDef::new(OrderAdjustments::Type).string().not_null())
                        .col(ColumnDef::new(OrderAdjustments::TypeId).big_integer().null())
                        .col(ColumnDef::new(OrderAdjustments::TypeKey).string().null())
                        .col(
                            ColumnDef::new(OrderAdjustments::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderAdjustments::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderAdjustments::Tax)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderAdjustments::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderAdjustments::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderAdjustments::DateModified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_adjustments_object")
                        .table(OrderAdjustments::Table)
                        .col(OrderAdjustments::ObjectType)
                        .col(OrderAdjustments::ObjectId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderAddresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderAddresses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderAddresses::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderAddresses::Type).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::Name).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::Address).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::Address2).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::City).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::Region).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::PostalCode).string().not_null())
                        .col(ColumnDef::new(OrderAddresses::Country).string().not_null())
                        .col(
                            ColumnDef::new(OrderAddresses::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderAddresses::DateModified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_addresses_order_type")
                        .table(OrderAddresses::Table)
                        .col(OrderAddresses::OrderId)
                        .col(OrderAddresses::Type)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderTransactions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OrderTransactions::ObjectId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTransactions::ObjectType).string().not_null())
                        .col(
                            ColumnDef::new(OrderTransactions::TransactionId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTransactions::Gateway).string().not_null())
                        .col(ColumnDef::new(OrderTransactions::Status).string().not_null())
                        .col(
                            ColumnDef::new(OrderTransactions::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderTransactions::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_transactions_transaction_id")
                        .table(OrderTransactions::Table)
                        .col(OrderTransactions::TransactionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderMeta::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderMeta::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderMeta::ObjectType).string().not_null())
                        .col(ColumnDef::new(OrderMeta::ObjectId).big_integer().not_null())
                        .col(ColumnDef::new(OrderMeta::MetaKey).string().not_null())
                        .col(ColumnDef::new(OrderMeta::MetaValue).text().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_meta_owner_key")
                        .table(OrderMeta::Table)
                        .col(OrderMeta::ObjectType)
                        .col(OrderMeta::ObjectId)
                        .col(OrderMeta::MetaKey)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderNotes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderNotes::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderNotes::ObjectType).string().not_null())
                        .col(ColumnDef::new(OrderNotes::ObjectId).big_integer().not_null())
                        .col(ColumnDef::new(OrderNotes::Content).text().not_null())
                        .col(ColumnDef::new(OrderNotes::UserId).big_integer().null())
                        .col(
                            ColumnDef::new(OrderNotes::DateCreated)
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
                .drop_table(Table::drop().table(OrderNotes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderMeta::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderAddresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderAdjustments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        Parent,
        OrderNumber,
        Status,
        Type,
        UserId,
        CustomerId,
        Email,
        Ip,
        Gateway,
        Mode,
        Currency,
        PaymentKey,
        TaxRateId,
        Subtotal,
        Discount,
        Tax,
        Total,
        DateCreated,
        DateModified,
        DateCompleted,
        DateRefundable,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        Parent,
        OrderId,
        ProductId,
        ProductName,
        PriceId,
        CartIndex,
        Status,
        Quantity,
        Amount,
        Subtotal,
        Discount,
        Tax,
        Total,
        DateCreated,
        DateModified,
    }

    #[derive(DeriveIden)]
    enum OrderAdjustments {
        Table,
        Id,
        Parent,
        ObjectId,
        ObjectType,
        Type,
        TypeId,
        TypeKey,
        Description,
        Subtotal,
        Tax,
        Total,
        DateCreated,
        DateModified,
    }

    #[derive(DeriveIden)]
    enum OrderAddresses {
        Table,
        Id,
        OrderId,
        Type,
        Name,
        Address,
        Address2,
        City,
        Region,
        PostalCode,
        Country,
        DateCreated,
        DateModified,
    }

    #[derive(DeriveIden)]
    enum OrderTransactions {
        Table,
        Id,
        ObjectId,
        ObjectType,
        TransactionId,
        Gateway,
        Status,
        Total,
        DateCreated,
    }

    #[derive(DeriveIden)]
    enum OrderMeta {
        Table,
        Id,
        ObjectType,
        ObjectId,
        MetaKey,
        MetaValue,
    }

    #[derive(DeriveIden)]
    enum OrderNotes {
        Table,
        Id,
        ObjectType,
        ObjectId,
        Content,
        UserId,
        DateCreated,
    }
}

mod m20240101_000002_create_customer_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_customer_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Customers::UserId).big_integer().null())
                        .col(
                            ColumnDef::new(Customers::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Status).string().not_null())
                        .col(
                            ColumnDef::new(Customers::PurchaseValue)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Customers::PurchaseCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Customers::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CustomerEmails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerEmails::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CustomerEmails::CustomerId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerEmails::Type).string().not_null())
                        .col(ColumnDef::new(CustomerEmails::Email).string().not_null())
                        .col(
                            ColumnDef::new(CustomerEmails::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_customer_emails_customer_id")
                                .from(CustomerEmails::Table, CustomerEmails::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customer_emails_email")
                        .table(CustomerEmails::Table)
                        .col(CustomerEmails::Email)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CustomerAddresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerAddresses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CustomerAddresses::CustomerId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerAddresses::IsPrimary)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(CustomerAddresses::Type).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::Name).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::Address).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::Address2).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::City).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::Region).string().not_null())
                        .col(
                            ColumnDef::new(CustomerAddresses::PostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerAddresses::Country).string().not_null())
                        .col(
                            ColumnDef::new(CustomerAddresses::DateCreated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_customer_addresses_customer_id")
                                .from(CustomerAddresses::Table, CustomerAddresses::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomerAddresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CustomerEmails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        UserId,
        Email,
        Name,
        Status,
        PurchaseValue,
        PurchaseCount,
        DateCreated,
    }

    #[derive(DeriveIden)]
    enum CustomerEmails {
        Table,
        Id,
        CustomerId,
        Type,
        Email,
        DateCreated,
    }

    #[derive(DeriveIden)]
    enum CustomerAddresses {
        Table,
        Id,
        CustomerId,
        IsPrimary,
        Type,
        Name,
        Address,
        Address2,
        City,
        Region,
        PostalCode,
        Country,
        DateCreated,
    }
}

mod m20240101_000003_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Status).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Products::VariablePricing)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Products::Sales)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Earnings)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductPrices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductPrices::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductPrices::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(ProductPrices::PriceIndex).big_integer().not_null())
                        .col(ColumnDef::new(ProductPrices::Name).string().not_null())
                        .col(
                            ColumnDef::new(ProductPrices::Amount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_prices_product_id")
                                .from(ProductPrices::Table, ProductPrices::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Discounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Discounts::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Discounts::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Discounts::Name).string().not_null())
                        .col(ColumnDef::new(Discounts::Status).string().not_null())
                        .col(ColumnDef::new(Discounts::AmountType).string().not_null())
                        .col(ColumnDef::new(Discounts::Amount).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Discounts::MinChargeAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Discounts::UseCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Discounts::MaxUses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Discounts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TaxRates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TaxRates::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(TaxRates::Country).string().not_null())
                        .col(
                            ColumnDef::new(TaxRates::Region)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(TaxRates::Rate).decimal().not_null())
                        .col(ColumnDef::new(TaxRates::Status).string().not_null())
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TaxRates::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Discounts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductPrices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Status,
        Price,
        VariablePricing,
        Sales,
        Earnings,
    }

    #[derive(DeriveIden)]
    enum ProductPrices {
        Table,
        Id,
        ProductId,
        PriceIndex,
        Name,
        Amount,
    }

    #[derive(DeriveIden)]
    enum Discounts {
        Table,
        Id,
        Code,
        Name,
        Status,
        AmountType,
        Amount,
        MinChargeAmount,
        UseCount,
        MaxUses,
        ExpiresAt,
    }

    #[derive(DeriveIden)]
    enum TaxRates {
        Table,
        Id,
        Country,
        Region,
        Rate,
        Status,
    }
}
