//! Procedural macros for Lattice Bind.
//!
//! This crate provides `#[derive(Bindable)]`, which implements
//! `lattice_bind::PropertyAccessor` for a struct so its fields can be read
//! and written by name through property paths.
//!
//! # Attributes
//!
//! ## `#[property]`
//!
//! ```ignore
//! use std::sync::Arc;
//! use lattice_bind::{Observable, Property};
//! use lattice_bind_macros::Bindable;
//!
//! #[derive(Bindable, Default)]
//! struct Customer {
//!     name: Property<String>,
//!
//!     #[property(name = "postCode")]
//!     post_code: Property<String>,
//!
//!     #[property(read_only)]
//!     id: Property<i64>,
//!
//!     // Plain fields are always read-only.
//!     created: i64,
//!
//!     #[property(skip)]
//!     cache: Vec<u8>,
//!
//!     observable: Observable,
//! }
//! ```
//!
//! Property attributes:
//! - `name = "..."`: The name used by paths (defaults to the field name)
//! - `read_only`: Writes fail with `PropertyError::ReadOnly`
//! - `skip`: Excludes the field from the accessor
//!
//! Fields starting with `_` are skipped unless they carry `#[property]`.
//!
//! ## `#[observable]`
//!
//! Marks the `Observable` field that announces changes. A field named
//! `observable` is picked up without the attribute. Without either, the
//! type is readable and writable but not observable.
//!
//! # Generated items
//!
//! - `impl PropertyAccessor`, whose `set` converts the value, stores it and
//!   publishes the change on the hub
//! - `PROPERTIES`, a static `PropertyMeta` table
//! - `wire_nested()`, which attaches the hubs of nested objects already
//!   held at construction time

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Ident, Lit,
    Meta, Type,
};

/// Derive `PropertyAccessor` and property metadata for a struct.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use lattice_bind::{Observable, Property, PropertyAccessor, Value};
/// use lattice_bind_macros::Bindable;
///
/// #[derive(Bindable, Default)]
/// struct Counter {
///     value: Property<i32>,
///     observable: Observable,
/// }
///
/// let counter = Arc::new(Counter::default());
/// counter.set("value", Value::Int(5)).unwrap();
/// assert_eq!(counter.get("value"), Some(Value::Int(5)));
/// ```
#[proc_macro_derive(Bindable, attributes(property, observable))]
pub fn derive_bindable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_bindable(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed property information.
struct PropertyInfo {
    field_name: Ident,
    /// Name seen by property paths.
    name: String,
    inner_type: Type,
    read_only: bool,
    is_property_wrapper: bool,
}

fn impl_derive_bindable(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Bindable derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Bindable derive only supports structs",
            ))
        }
    };

    let hub_field = find_hub_field(fields.iter())?;

    let mut properties: Vec<PropertyInfo> = Vec::new();
    for field in fields.iter() {
        if hub_field.as_ref().is_some_and(|hub| field.ident.as_ref() == Some(hub)) {
            continue;
        }
        if let Some(info) = parse_property_field(field)? {
            if properties.iter().any(|p| p.name == info.name) {
                return Err(syn::Error::new_spanned(
                    field,
                    format!("duplicate property name `{}`", info.name),
                ));
            }
            properties.push(info);
        }
    }

    let getters = generate_getters(&properties);
    let setters = generate_setters(&properties, hub_field.as_ref());
    let type_arms = generate_type_arms(&properties);
    let property_meta = generate_property_meta(&properties);

    let observable_fn = match &hub_field {
        Some(hub) => quote! {
            fn observable(&self) -> Option<&lattice_bind::Observable> {
                Some(&self.#hub)
            }
        },
        None => quote! {},
    };

    let wire_nested = generate_wire_nested(&properties, hub_field.as_ref());

    let expanded = quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            /// Static property metadata for this type (generated by #[derive(Bindable)]).
            pub const PROPERTIES: &'static [lattice_bind::PropertyMeta] = &#property_meta;

            #wire_nested
        }

        impl #impl_generics lattice_bind::PropertyAccessor for #struct_name #ty_generics #where_clause {
            fn get(&self, name: &str) -> Option<lattice_bind::Value> {
                match name {
                    #(#getters)*
                    _ => None,
                }
            }

            fn set(
                &self,
                name: &str,
                value: lattice_bind::Value,
            ) -> std::result::Result<(), lattice_bind::PropertyError> {
                match name {
                    #(#setters)*
                    _ => Err(lattice_bind::PropertyError::not_found(name)),
                }
            }

            fn type_of(&self, name: &str) -> Option<lattice_bind::ValueType> {
                match name {
                    #(#type_arms)*
                    _ => None,
                }
            }

            #observable_fn

            fn type_name(&self) -> &'static str {
                stringify!(#struct_name)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn into_any(
                self: std::sync::Arc<Self>,
            ) -> std::sync::Arc<dyn std::any::Any + Send + Sync> {
                self
            }
        }
    };

    Ok(expanded)
}

/// Find the field holding the `Observable`, if any.
fn find_hub_field<'a>(fields: impl Iterator<Item = &'a Field>) -> syn::Result<Option<Ident>> {
    let mut marked: Option<&Field> = None;
    let mut by_name: Option<&Field> = None;

    for field in fields {
        if has_attr(&field.attrs, "observable") {
            if let Some(previous) = marked {
                let mut err = syn::Error::new_spanned(field, "only one field may be #[observable]");
                err.combine(syn::Error::new_spanned(previous, "first #[observable] field"));
                return Err(err);
            }
            marked = Some(field);
        } else if field.ident.as_ref().is_some_and(|i| i == "observable") {
            by_name = Some(field);
        }
    }

    Ok(marked.or(by_name).and_then(|field| field.ident.clone()))
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Parse one field into property information, or `None` if it is skipped.
fn parse_property_field(field: &Field) -> syn::Result<Option<PropertyInfo>> {
    let field_name = match &field.ident {
        Some(name) => name.clone(),
        None => return Ok(None),
    };

    let mut name = None;
    let mut read_only = false;
    let mut has_property_attr = false;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("property") {
            continue;
        }
        has_property_attr = true;

        // A bare #[property] has no arguments to parse.
        if !matches!(attr.meta, Meta::List(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: Expr = meta.value()?.parse()?;
                match value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(lit_str),
                        ..
                    }) => {
                        let text = lit_str.value();
                        if text.is_empty() || text.contains('.') {
                            return Err(syn::Error::new_spanned(
                                lit_str,
                                "property name must be non-empty and contain no '.'",
                            ));
                        }
                        name = Some(text);
                    }
                    other => {
                        return Err(syn::Error::new_spanned(other, "expected a string literal"));
                    }
                }
            } else if meta.path.is_ident("read_only") {
                read_only = true;
            } else if meta.path.is_ident("skip") {
                skip = true;
            } else {
                return Err(meta.error("unsupported property attribute"));
            }
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }

    if !has_property_attr && (field_name.to_string().starts_with('_') || is_observable_type(&field.ty)) {
        return Ok(None);
    }

    let (inner_type, is_property_wrapper) = extract_inner_type(&field.ty);

    Ok(Some(PropertyInfo {
        name: name.unwrap_or_else(|| field_name.to_string()),
        field_name,
        inner_type,
        // Plain fields have no interior mutability.
        read_only: read_only || !is_property_wrapper,
        is_property_wrapper,
    }))
}

/// Extract inner type from Property<T> or return the original type.
fn extract_inner_type(ty: &Type) -> (Type, bool) {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Property" {
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                        return (inner.clone(), true);
                    }
                }
            }
        }
    }
    (ty.clone(), false)
}

fn is_observable_type(ty: &Type) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Observable"),
        _ => false,
    }
}

/// Convert a type to a string representation.
fn type_to_string(ty: &Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}

fn generate_getters(properties: &[PropertyInfo]) -> Vec<TokenStream2> {
    properties
        .iter()
        .map(|prop| {
            let field_name = &prop.field_name;
            let name = &prop.name;
            let inner_type = &prop.inner_type;
            let read = if prop.is_property_wrapper {
                quote! { &self.#field_name.get() }
            } else {
                quote! { &self.#field_name }
            };
            quote! {
                #name => Some(<#inner_type as lattice_bind::PropertyValue>::to_value(#read)),
            }
        })
        .collect()
}

fn generate_setters(properties: &[PropertyInfo], hub: Option<&Ident>) -> Vec<TokenStream2> {
    properties
        .iter()
        .map(|prop| {
            let field_name = &prop.field_name;
            let name = &prop.name;
            let inner_type = &prop.inner_type;

            if prop.read_only {
                return quote! {
                    #name => Err(lattice_bind::PropertyError::read_only(#name)),
                };
            }

            let publish = match hub {
                Some(hub) => quote! {
                    let old_value = <#inner_type as lattice_bind::PropertyValue>::to_value(&old);
                    self.#hub.publish_change(#name, &old_value, &new_value);
                },
                None => quote! {
                    let _ = (old, new_value);
                },
            };

            quote! {
                #name => {
                    let new = <#inner_type as lattice_bind::PropertyValue>::from_value(value)?;
                    let new_value = <#inner_type as lattice_bind::PropertyValue>::to_value(&new);
                    let old = self.#field_name.swap(new);
                    #publish
                    Ok(())
                }
            }
        })
        .collect()
}

fn generate_type_arms(properties: &[PropertyInfo]) -> Vec<TokenStream2> {
    properties
        .iter()
        .map(|prop| {
            let name = &prop.name;
            let inner_type = &prop.inner_type;
            quote! {
                #name => Some(<#inner_type as lattice_bind::PropertyValue>::VALUE_TYPE),
            }
        })
        .collect()
}

/// Generate property metadata array.
fn generate_property_meta(properties: &[PropertyInfo]) -> TokenStream2 {
    let meta_entries: Vec<TokenStream2> = properties
        .iter()
        .map(|prop| {
            let name = &prop.name;
            let inner_type = &prop.inner_type;
            let type_name_str = type_to_string(inner_type);
            let read_only = prop.read_only;

            quote! {
                lattice_bind::PropertyMeta::new(
                    #name,
                    #type_name_str,
                    <#inner_type as lattice_bind::PropertyValue>::VALUE_TYPE,
                    #read_only,
                )
            }
        })
        .collect();

    quote! { [#(#meta_entries),*] }
}

fn generate_wire_nested(properties: &[PropertyInfo], hub: Option<&Ident>) -> TokenStream2 {
    let Some(hub) = hub else {
        return quote! {};
    };

    let attaches: Vec<TokenStream2> = properties
        .iter()
        .map(|prop| {
            let field_name = &prop.field_name;
            let name = &prop.name;
            let inner_type = &prop.inner_type;
            let read = if prop.is_property_wrapper {
                quote! { &self.#field_name.get() }
            } else {
                quote! { &self.#field_name }
            };
            quote! {
                if let Some(child) =
                    <#inner_type as lattice_bind::PropertyValue>::to_value(#read).observable()
                {
                    self.#hub.attach_nested(#name, &child);
                }
            }
        })
        .collect();

    quote! {
        /// Start bubbling changes from the nested objects currently held.
        ///
        /// Call once after construction. Later writes through `set` keep
        /// the wiring current on their own.
        pub fn wire_nested(&self) {
            #(#attaches)*
        }
    }
}
