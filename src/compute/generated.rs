// Vendored output of `tonic_build::configure().compile_protos(&["proto/model_discovery.proto"], &["proto"])`.
// See `build.rs` for the regeneration recipe. Do not hand-edit field tags.
#![allow(clippy::derive_partial_eq_without_eq)]

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub client_version: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HelloResponse {
    #[prost(string, tag = "1")]
    pub runtime_version: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub allowed_value_types: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "3")]
    pub extensions: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProblemDescription {
    #[prost(string, tag = "1")]
    pub target_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub target_column_index: i32,
    #[prost(string, tag = "3")]
    pub task: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub sub_task: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "5")]
    pub metrics: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchSolutionsRequest {
    #[prost(string, tag = "1")]
    pub train_uri: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub test_uri: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub problem: ::core::option::Option<ProblemDescription>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub pipeline_description: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(int64, tag = "5")]
    pub max_solutions: i64,
    #[prost(int64, tag = "6")]
    pub time_bound_seconds: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchSolutionsResponse {
    #[prost(string, tag = "1")]
    pub search_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub solution_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopSearchSolutionsRequest {
    #[prost(string, tag = "1")]
    pub search_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopSearchSolutionsResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndSearchSolutionsRequest {
    #[prost(string, tag = "1")]
    pub search_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndSearchSolutionsResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScoreSolutionRequest {
    #[prost(string, tag = "1")]
    pub solution_id: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub metrics: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScoreSolutionResponse {
    #[prost(map = "string, double", tag = "1")]
    pub scores: ::std::collections::HashMap<::prost::alloc::string::String, f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FitSolutionRequest {
    #[prost(string, tag = "1")]
    pub solution_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FitSolutionResponse {
    #[prost(string, tag = "1")]
    pub fitted_solution_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceSolutionRequest {
    #[prost(string, tag = "1")]
    pub fitted_solution_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub inputs_uri: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProduceSolutionResponse {
    #[prost(string, tag = "1")]
    pub result_uri: ::prost::alloc::string::String,
}

/// Generated client bindings for `distil.compute.v1.ModelDiscovery`.
pub mod model_discovery_client {
    #![allow(unused_variables, dead_code, clippy::let_unit_value)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct ModelDiscoveryClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl ModelDiscoveryClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> ModelDiscoveryClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            Self { inner: tonic::client::Grpc::new(inner) }
        }

        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> ModelDiscoveryClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T::ResponseBody: Default,
        {
            ModelDiscoveryClient::new(InterceptedService::new(inner, interceptor))
        }

        pub async fn hello(
            &mut self,
            request: impl tonic::IntoRequest<super::HelloRequest>,
        ) -> std::result::Result<tonic::Response<super::HelloResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/Hello",
            );
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("distil.compute.v1.ModelDiscovery", "Hello"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn search_solutions(
            &mut self,
            request: impl tonic::IntoRequest<super::SearchSolutionsRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::SearchSolutionsResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/SearchSolutions",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "SearchSolutions",
            ));
            self.inner.server_streaming(req, path, codec).await
        }

        pub async fn stop_search_solutions(
            &mut self,
            request: impl tonic::IntoRequest<super::StopSearchSolutionsRequest>,
        ) -> std::result::Result<tonic::Response<super::StopSearchSolutionsResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/StopSearchSolutions",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "StopSearchSolutions",
            ));
            self.inner.unary(req, path, codec).await
        }

        pub async fn end_search_solutions(
            &mut self,
            request: impl tonic::IntoRequest<super::EndSearchSolutionsRequest>,
        ) -> std::result::Result<tonic::Response<super::EndSearchSolutionsResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/EndSearchSolutions",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "EndSearchSolutions",
            ));
            self.inner.unary(req, path, codec).await
        }

        pub async fn score_solution(
            &mut self,
            request: impl tonic::IntoRequest<super::ScoreSolutionRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::ScoreSolutionResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/ScoreSolution",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "ScoreSolution",
            ));
            self.inner.server_streaming(req, path, codec).await
        }

        pub async fn fit_solution(
            &mut self,
            request: impl tonic::IntoRequest<super::FitSolutionRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::FitSolutionResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/FitSolution",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "FitSolution",
            ));
            self.inner.server_streaming(req, path, codec).await
        }

        pub async fn produce_solution(
            &mut self,
            request: impl tonic::IntoRequest<super::ProduceSolutionRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::ProduceSolutionResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/distil.compute.v1.ModelDiscovery/ProduceSolution",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "distil.compute.v1.ModelDiscovery",
                "ProduceSolution",
            ));
            self.inner.server_streaming(req, path, codec).await
        }
    }
}
