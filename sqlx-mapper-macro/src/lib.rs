use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, parse_quote};

/// One bound field of the deriving struct.
struct BoundField<'a> {
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
    key: String,
}

/// Derive macro listing the fields of a struct as statement parameters.
///
/// Implements `Record` (one binding per field, in declaration order), `Element` (so a
/// slice of the struct can be iterated by `<foreach>`) and `Project` (a row of the field
/// values, used when logging results).
///
/// # Attributes
///
/// ## `#[param(skip)]`
/// Leaves the field out of the parameter table and of the projection.
///
/// ## `#[param(rename = "...")]`
/// Binds the field under another name.
///
/// # Example
/// ```ignore
/// use sqlx_mapper::Record;
///
/// #[derive(Record)]
/// struct UserQuery<'a> {
///     name: &'a str,
///     #[param(rename = "minAge")]
///     min_age: i32,
///     ids: Vec<i64>,
///     #[param(skip)]
///     cache_key: String,
/// }
/// ```
///
/// Every bound field type must implement `Param` and `Project`.
#[proc_macro_derive(Record, attributes(param))]
pub fn record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record needs named fields; unit structs have nothing to bind",
                ));
            }
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record needs named fields to know parameter names",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut bound = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let mut key = ident.to_string();
        let mut skip = false;
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("param")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    key = lit.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `skip` or `rename = \"...\"`"))
                }
            })?;
        }
        if !skip {
            bound.push(BoundField {
                ident,
                ty: &field.ty,
                key,
            });
        }
    }

    let mut generics = input.generics.clone();
    {
        let where_clause = generics.make_where_clause();
        for field in &bound {
            let ty = field.ty;
            where_clause
                .predicates
                .push(parse_quote!(#ty: ::sqlx_mapper::Param + ::sqlx_mapper::Project));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let entries = bound.iter().map(|f| {
        let ident = f.ident;
        let key = &f.key;
        quote! {
            (#key, ::sqlx_mapper::Param::to_binding(&self.#ident)?)
        }
    });
    let columns = bound.iter().map(|f| {
        let ident = f.ident;
        quote! {
            ::sqlx_mapper::Project::project(&self.#ident)
        }
    });

    Ok(quote! {
        impl #impl_generics ::sqlx_mapper::Record for #name #ty_generics #where_clause {
            fn fields(
                &self,
            ) -> ::std::result::Result<
                ::std::vec::Vec<(&'static str, ::sqlx_mapper::Binding)>,
                ::sqlx_mapper::Error,
            > {
                ::std::result::Result::Ok(::std::vec![#(#entries),*])
            }
        }

        impl #impl_generics ::sqlx_mapper::Element for #name #ty_generics #where_clause {
            fn to_element(
                &self,
            ) -> ::std::result::Result<::sqlx_mapper::Environment, ::sqlx_mapper::Error> {
                ::sqlx_mapper::bind_record(self)
            }
        }

        impl #impl_generics ::sqlx_mapper::Project for #name #ty_generics #where_clause {
            fn project(&self) -> ::sqlx_mapper::Projection {
                ::sqlx_mapper::Projection::Row(::std::vec![#(#columns),*])
            }
        }
    })
}
